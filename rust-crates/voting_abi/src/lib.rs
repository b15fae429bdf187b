//! Typed bindings for the voting contracts.
//!
//! The contracts are deployed and maintained outside this repository; only their
//! public surface is mirrored here so the client can encode calls and decode results.

use alloy::sol;

pub use factory::VotingRoomFactory;
pub use room::VotingRoom;

pub mod factory {
    use super::*;

    sol! {
        #[sol(rpc)]
        contract VotingRoomFactory {
            struct RoomInfo {
                string roomName;
                address roomAddress;
                address createdBy;
            }

            function creator() external view returns (address);
            function getSuperAdmins() external view returns (address[] memory);
            function getRooms() external view returns (RoomInfo[] memory);

            function createRoom(
                string memory roomName,
                string memory description,
                uint256 maxVoters
            ) external returns (address);
            function addSuperAdmin(address admin) external;
            function removeSuperAdmin(address admin) external;
            function transferCreator(address newCreator) external;
            function deactivateAndDeleteRoom(address room) external;
            function factoryReset() external;
        }
    }
}

pub mod room {
    use super::*;

    sol! {
        #[sol(rpc)]
        contract VotingRoom {
            struct Voter {
                address voterAddress;
                string name;
            }

            struct Candidate {
                uint256 id;
                string name;
                uint256 voteCount;
            }

            function roomName() external view returns (string memory);
            function description() external view returns (string memory);
            function roomAdmin() external view returns (address);
            function superAdmin() external view returns (address);
            function getVoters() external view returns (Voter[] memory);
            function getCandidates() external view returns (Candidate[] memory);
            function isActive() external view returns (bool);
            function votingStarted() external view returns (bool);
            function votingEnded() external view returns (bool);
            function maxVoters() external view returns (uint256);
            function factory() external view returns (address);

            function startVote() external;
            function endVote() external;
            function addCandidate(string memory name) external;
            function addVoter(address voter, string memory name) external;
            function removeVoter(address voter) external;
            function vote(uint256 candidateId) external;
            function deactivateRoom() external;
            function transferAdmin(address newAdmin) external;
            function resetRoom() external;
            function clearVotes() external;
            function clearCandidates() external;
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use alloy::sol_types::SolCall;

    #[test]
    fn factory_calls__signatures_match_deployed_abi() {
        assert_eq!(VotingRoomFactory::creatorCall::SIGNATURE, "creator()");
        assert_eq!(
            VotingRoomFactory::createRoomCall::SIGNATURE,
            "createRoom(string,string,uint256)"
        );
        assert_eq!(
            VotingRoomFactory::deactivateAndDeleteRoomCall::SIGNATURE,
            "deactivateAndDeleteRoom(address)"
        );
    }

    #[test]
    fn room_calls__signatures_match_deployed_abi() {
        assert_eq!(
            VotingRoom::addVoterCall::SIGNATURE,
            "addVoter(address,string)"
        );
        assert_eq!(VotingRoom::voteCall::SIGNATURE, "vote(uint256)");
        assert_eq!(VotingRoom::getCandidatesCall::SIGNATURE, "getCandidates()");
    }
}
