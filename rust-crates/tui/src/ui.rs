use crate::client::AppSnapshot;
use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::{
    event::{
        self,
        Event,
        KeyCode,
        KeyEvent,
        KeyEventKind,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use itertools::Itertools;
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::io::stdout;
use tokio::sync::mpsc;
use unicode_width::UnicodeWidthChar;
use voting_client::{
    Account,
    actions::{
        FactoryAction,
        RoomAction,
    },
    aggregator::{
        FetchStatus,
        RoomState,
    },
    room::{
        PartialRoomDetail,
        sort_candidates,
        sort_voters,
        vote_share_percent,
    },
};
use voting_tui::router::{
    Page,
    View,
};

const UNKNOWN: &str = "…";
const NAME_WIDTH: usize = 28;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserEvent {
    Quit,
    Redraw,
    Back,
    Refresh,
    Navigate(Page),
    Connect,
    SwitchAccount,
    DisconnectWallet,
    OpenRoom { index: usize, page: Page },
    RoomPage(Page),
    Vote { index: usize },
    Room(RoomAction),
    Factory(FactoryAction),
    Submit { form: FormKind, values: Vec<String> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormKind {
    CreateRoom,
    JoinRoom,
    AddCandidate,
    AddVoter,
    RemoveVoter,
    TransferAdmin,
    AddSuperAdmin,
    RemoveSuperAdmin,
    TransferCreator,
    DeleteRoom,
}

impl FormKind {
    pub fn title(self) -> &'static str {
        match self {
            FormKind::CreateRoom => "Create Room",
            FormKind::JoinRoom => "Join Room",
            FormKind::AddCandidate => "Add Candidate",
            FormKind::AddVoter => "Add Voter",
            FormKind::RemoveVoter => "Remove Voter",
            FormKind::TransferAdmin => "Transfer Room Admin",
            FormKind::AddSuperAdmin => "Add Super Admin",
            FormKind::RemoveSuperAdmin => "Remove Super Admin",
            FormKind::TransferCreator => "Transfer Factory Creator",
            FormKind::DeleteRoom => "Deactivate And Delete Room",
        }
    }

    pub fn fields(self) -> &'static [&'static str] {
        match self {
            FormKind::CreateRoom => &["Room name", "Description", "Max voters"],
            FormKind::JoinRoom => &["Room address"],
            FormKind::AddCandidate => &["Candidate name"],
            FormKind::AddVoter => &["Voter address", "Voter name"],
            FormKind::RemoveVoter => &["Voter address"],
            FormKind::TransferAdmin => &["New admin address"],
            FormKind::AddSuperAdmin | FormKind::RemoveSuperAdmin => &["Account address"],
            FormKind::TransferCreator => &["New creator address"],
            FormKind::DeleteRoom => &["Room address"],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct FormState {
    kind: FormKind,
    values: Vec<String>,
    focus: usize,
}

impl FormState {
    fn new(kind: FormKind) -> Self {
        FormState {
            kind,
            values: vec![String::new(); kind.fields().len()],
            focus: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct ConfirmState {
    prompt: String,
    event: Box<UserEvent>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
enum Mode {
    #[default]
    Normal,
    Form(FormState),
    Confirm(ConfirmState),
    QuitModal,
}

#[derive(Default)]
pub struct UiState {
    mode: Mode,
    selected: usize,
    rows: usize,
    view: Option<View>,
    page: Page,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

pub type InputEventReceiver = mpsc::UnboundedReceiver<std::io::Result<Event>>;

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

/// Reads terminal input on a dedicated thread so the event loop can select on it.
pub fn input_event_stream() -> InputEventReceiver {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        loop {
            let event = event::read();
            let failed = event.is_err();
            if tx.send(event).is_err() || failed {
                break;
            }
        }
    });
    rx
}

pub async fn next_raw_event(events: &mut InputEventReceiver) -> Result<Event> {
    let event = events
        .recv()
        .await
        .ok_or_else(|| eyre!("terminal input closed"))?;
    Ok(event?)
}

pub fn draw(state: &mut UiState, snap: &AppSnapshot) -> Result<()> {
    sync_with_snapshot(state, snap);
    if let Some(mut term) = state.terminal.take() {
        let result = term.draw(|f| ui(f, state, snap)).map(|_| ());
        state.terminal = Some(term);
        result?;
    }
    Ok(())
}

/// Keeps the selection inside whatever the mounted view currently lists.
fn sync_with_snapshot(state: &mut UiState, snap: &AppSnapshot) {
    if state.view != snap.view {
        state.view = snap.view;
        state.selected = 0;
    }
    state.page = snap.page;
    state.rows = match snap.page {
        Page::Home | Page::MyRooms => snap.listing.len(),
        Page::RoomInteract => snap
            .room_detail()
            .and_then(|d| d.candidates.as_ref())
            .map_or(0, Vec::len),
        _ => 0,
    };
    state.selected = state.selected.min(state.rows.saturating_sub(1));
}

pub fn interpret_event(state: &mut UiState, event: Event) -> Option<UserEvent> {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => interpret_key(state, key),
        Event::Resize(..) => Some(UserEvent::Redraw),
        _ => None,
    }
}

fn interpret_key(state: &mut UiState, key: KeyEvent) -> Option<UserEvent> {
    match &mut state.mode {
        Mode::QuitModal => {
            return match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => Some(UserEvent::Quit),
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                _ => None,
            };
        }
        Mode::Confirm(_) => {
            return match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => {
                    match std::mem::take(&mut state.mode) {
                        Mode::Confirm(confirm) => Some(*confirm.event),
                        _ => None,
                    }
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                _ => None,
            };
        }
        Mode::Form(form) => {
            return match key.code {
                KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                KeyCode::Tab | KeyCode::Down => {
                    form.focus = (form.focus + 1) % form.values.len();
                    Some(UserEvent::Redraw)
                }
                KeyCode::BackTab | KeyCode::Up => {
                    form.focus = (form.focus + form.values.len() - 1) % form.values.len();
                    Some(UserEvent::Redraw)
                }
                KeyCode::Backspace => {
                    form.values[form.focus].pop();
                    Some(UserEvent::Redraw)
                }
                KeyCode::Char(c) => {
                    form.values[form.focus].push(c);
                    Some(UserEvent::Redraw)
                }
                KeyCode::Enter if form.focus + 1 < form.values.len() => {
                    form.focus += 1;
                    Some(UserEvent::Redraw)
                }
                KeyCode::Enter => match std::mem::take(&mut state.mode) {
                    Mode::Form(form) => Some(UserEvent::Submit {
                        form: form.kind,
                        values: form.values,
                    }),
                    _ => None,
                },
                _ => None,
            };
        }
        Mode::Normal => {}
    }

    if let Some(event) = interpret_page_key(state, key.code) {
        return Some(event);
    }

    match key.code {
        KeyCode::Char('q') => {
            state.mode = Mode::QuitModal;
            Some(UserEvent::Redraw)
        }
        KeyCode::Esc | KeyCode::Backspace => Some(UserEvent::Back),
        KeyCode::Up => {
            state.selected = state.selected.saturating_sub(1);
            Some(UserEvent::Redraw)
        }
        KeyCode::Down => {
            if state.selected + 1 < state.rows {
                state.selected += 1;
            }
            Some(UserEvent::Redraw)
        }
        KeyCode::Char('c') => Some(UserEvent::Connect),
        KeyCode::Char('w') => Some(UserEvent::SwitchAccount),
        KeyCode::Char('x') => Some(UserEvent::DisconnectWallet),
        KeyCode::Char('r') => Some(UserEvent::Refresh),
        KeyCode::Char('l') => Some(UserEvent::Navigate(Page::Landing)),
        KeyCode::Char('h') => Some(UserEvent::Navigate(Page::Home)),
        KeyCode::Char('m') => Some(UserEvent::Navigate(Page::MyRooms)),
        KeyCode::Char('a') => Some(UserEvent::Navigate(Page::AdminPanel)),
        KeyCode::Char('n') => {
            state.mode = Mode::Form(FormState::new(FormKind::CreateRoom));
            Some(UserEvent::Navigate(Page::Create))
        }
        KeyCode::Char('j') => {
            state.mode = Mode::Form(FormState::new(FormKind::JoinRoom));
            Some(UserEvent::Navigate(Page::Join))
        }
        _ => None,
    }
}

fn open_form(state: &mut UiState, kind: FormKind) -> Option<UserEvent> {
    state.mode = Mode::Form(FormState::new(kind));
    Some(UserEvent::Redraw)
}

fn confirm(state: &mut UiState, prompt: impl Into<String>, event: UserEvent) -> Option<UserEvent> {
    state.mode = Mode::Confirm(ConfirmState {
        prompt: prompt.into(),
        event: Box::new(event),
    });
    Some(UserEvent::Redraw)
}

fn interpret_page_key(state: &mut UiState, code: KeyCode) -> Option<UserEvent> {
    let index = state.selected;
    let has_rows = state.rows > 0;
    match (state.page, code) {
        (Page::Home | Page::MyRooms, KeyCode::Enter) if has_rows => Some(UserEvent::OpenRoom {
            index,
            page: Page::RoomInteract,
        }),
        (Page::Home | Page::MyRooms, KeyCode::Char('d')) if has_rows => {
            Some(UserEvent::OpenRoom {
                index,
                page: Page::RoomDetail,
            })
        }
        (Page::Home | Page::MyRooms, KeyCode::Char('v')) if has_rows => {
            Some(UserEvent::OpenRoom {
                index,
                page: Page::RoomMembers,
            })
        }
        (Page::Create, KeyCode::Enter) => open_form(state, FormKind::CreateRoom),
        (Page::Join, KeyCode::Enter) => open_form(state, FormKind::JoinRoom),

        (page, KeyCode::Char('i')) if page.is_room_page() => {
            Some(UserEvent::RoomPage(Page::RoomInteract))
        }
        (page, KeyCode::Char('d')) if page.is_room_page() => {
            Some(UserEvent::RoomPage(Page::RoomDetail))
        }
        (page, KeyCode::Char('v')) if page.is_room_page() => {
            Some(UserEvent::RoomPage(Page::RoomMembers))
        }
        (Page::RoomInteract, KeyCode::Enter) if has_rows => Some(UserEvent::Vote { index }),

        (Page::RoomDetail, KeyCode::Char('s')) => Some(UserEvent::Room(RoomAction::StartVote)),
        (Page::RoomDetail, KeyCode::Char('e')) => confirm(
            state,
            "End voting in this room?",
            UserEvent::Room(RoomAction::EndVote),
        ),
        (Page::RoomDetail, KeyCode::Char('+')) => open_form(state, FormKind::AddCandidate),
        (Page::RoomDetail, KeyCode::Char('V')) => open_form(state, FormKind::AddVoter),
        (Page::RoomDetail, KeyCode::Char('-')) => open_form(state, FormKind::RemoveVoter),
        (Page::RoomDetail, KeyCode::Char('t')) => open_form(state, FormKind::TransferAdmin),
        (Page::RoomDetail, KeyCode::Char('R')) => confirm(
            state,
            "Reset this room? Candidates, voters and votes are cleared.",
            UserEvent::Room(RoomAction::ResetRoom),
        ),
        (Page::RoomDetail, KeyCode::Char('C')) => confirm(
            state,
            "Clear every vote in this room?",
            UserEvent::Room(RoomAction::ClearVotes),
        ),
        (Page::RoomDetail, KeyCode::Char('K')) => confirm(
            state,
            "Remove every candidate from this room?",
            UserEvent::Room(RoomAction::ClearCandidates),
        ),
        (Page::RoomDetail, KeyCode::Char('X')) => confirm(
            state,
            "Deactivate this room?",
            UserEvent::Room(RoomAction::DeactivateRoom),
        ),

        (Page::AdminPanel, KeyCode::Char('+')) => open_form(state, FormKind::AddSuperAdmin),
        (Page::AdminPanel, KeyCode::Char('-')) => open_form(state, FormKind::RemoveSuperAdmin),
        (Page::AdminPanel, KeyCode::Char('T')) => open_form(state, FormKind::TransferCreator),
        (Page::AdminPanel, KeyCode::Char('D')) => open_form(state, FormKind::DeleteRoom),
        (Page::AdminPanel, KeyCode::Char('F')) => confirm(
            state,
            "Reset the factory? Every room and super admin is removed.",
            UserEvent::Factory(FactoryAction::FactoryReset),
        ),
        _ => None,
    }
}

fn ui(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // session + network
            Constraint::Min(8),    // current view
            Constraint::Length(9), // status/errors + help
        ])
        .split(f.area());

    draw_header(f, chunks[0], snap);
    draw_view(f, state, chunks[1], snap);
    draw_bottom(f, chunks[2], snap);
    draw_modals(f, state);
}

fn draw_header(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let account = match (&snap.session.account, &snap.wallet_label) {
        (Some(account), Some(label)) => format!("{label} {}", account.short()),
        (Some(account), None) => account.short(),
        (None, _) if snap.has_wallet => String::from("not connected"),
        (None, _) => String::from("no wallet"),
    };
    let lines = vec![
        Line::from(format!(
            "Account: {account} | Role: {} | Network: {}",
            snap.session.role, snap.network
        )),
        Line::from(format!("Factory: {}", snap.factory)),
    ];
    let widget = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Voting Rooms"),
    );
    f.render_widget(widget, area);
}

fn draw_view(f: &mut Frame, state: &UiState, area: Rect, snap: &AppSnapshot) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(snap.page.title());
    let lines = match snap.view {
        None => vec![Line::styled(
            "No room selected. Open one from a room list or join by address.",
            Style::default().fg(Color::DarkGray),
        )],
        Some(View::Landing) => landing_lines(snap),
        Some(View::Create) => vec![Line::from(
            "Press Enter to fill in the new room's name, description and voter limit.",
        )],
        Some(View::Join) => vec![Line::from(
            "Press Enter and paste the address of the room you were invited to.",
        )],
        Some(View::Home) | Some(View::MyRooms) => {
            draw_room_table(f, state, area, snap, block);
            return;
        }
        Some(View::RoomInteract(_)) => room_lines(snap, |detail, lines| {
            interact_lines(state, snap, detail, lines)
        }),
        Some(View::RoomDetail(_)) => room_lines(snap, |detail, lines| {
            detail_lines(snap, detail, lines)
        }),
        Some(View::RoomMembers(_)) => room_lines(snap, members_lines),
        Some(View::AdminPanel) => admin_lines(snap),
    };
    let widget = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(block);
    f.render_widget(widget, area);
}

fn landing_lines(snap: &AppSnapshot) -> Vec<Line<'static>> {
    let mut lines = vec![
        Line::from("Create voting rooms, invite voters and run elections on chain."),
        Line::from(""),
    ];
    if !snap.has_wallet {
        lines.push(Line::styled(
            "No wallet detected. Restart with --wallet <name> to unlock a keystore.",
            Style::default().fg(Color::Yellow),
        ));
    } else if !snap.session.is_connected() {
        lines.push(Line::from("Press c to connect your wallet."));
    } else {
        lines.push(Line::from(format!(
            "Connected. You are signed in as {}.",
            snap.session.role
        )));
    }
    lines.push(Line::from(""));
    lines.push(Line::from("h  browse all rooms"));
    lines.push(Line::from("m  rooms you created"));
    lines.push(Line::from("n  create a room"));
    lines.push(Line::from("j  join a room by address"));
    if snap.session.role.is_factory_admin() {
        lines.push(Line::from("a  factory administration"));
    }
    lines
}

fn draw_room_table(f: &mut Frame, state: &UiState, area: Rect, snap: &AppSnapshot, block: Block) {
    let placeholder = match &snap.listing_status {
        FetchStatus::Loading => Some(String::from("Loading rooms...")),
        FetchStatus::Failed(err) => Some(format!("Could not load rooms: {err}")),
        FetchStatus::Ready if snap.listing.is_empty() => Some(match snap.page {
            Page::MyRooms if !snap.session.is_connected() => {
                String::from("Connect a wallet to see the rooms you created.")
            }
            Page::MyRooms => String::from("You have not created any rooms yet. Press n to create one."),
            _ => String::from("No rooms have been created yet."),
        }),
        FetchStatus::Ready => None,
    };
    if let Some(text) = placeholder {
        f.render_widget(Paragraph::new(text).block(block), area);
        return;
    }

    let header = Row::new(vec!["", "Room", "Address", "Creator", "Status", "Cand.", "Voters", "Votes"])
        .style(Style::default().add_modifier(Modifier::BOLD));
    let rows = snap.listing.rooms().iter().enumerate().map(|(i, room)| {
        let cursor = if i == state.selected { ">" } else { " " };
        let mut cells = vec![
            cursor.to_string(),
            truncate(room.display_name().unwrap_or(UNKNOWN), NAME_WIDTH),
            room.address.short(),
            room.summary
                .as_ref()
                .map_or_else(|| UNKNOWN.to_string(), |s| s.created_by.short()),
        ];
        cells.extend(room_row_cells(room));
        let row = Row::new(cells);
        if i == state.selected {
            row.style(Style::default().add_modifier(Modifier::REVERSED))
        } else {
            row
        }
    });
    let widths = [
        Constraint::Length(1),
        Constraint::Length(NAME_WIDTH as u16),
        Constraint::Length(13),
        Constraint::Length(13),
        Constraint::Length(12),
        Constraint::Length(6),
        Constraint::Length(7),
        Constraint::Length(6),
    ];
    let table = Table::new(rows, widths).header(header).block(block);
    f.render_widget(table, area);
}

fn room_row_cells(room: &RoomState) -> Vec<String> {
    let count = |len: Option<usize>| len.map_or_else(|| UNKNOWN.to_string(), |n| n.to_string());
    match (&room.detail, &room.status) {
        (None, FetchStatus::Loading) => pending_cells("loading..."),
        (None, FetchStatus::Failed(_)) => pending_cells("unavailable"),
        (None, FetchStatus::Ready) => vec![UNKNOWN.to_string(); 4],
        (Some(detail), _) => vec![
            room_status(detail).to_string(),
            count(detail.candidates.as_ref().map(Vec::len)),
            count(detail.voters.as_ref().map(Vec::len)),
            detail
                .candidates
                .as_ref()
                .map_or_else(|| UNKNOWN.to_string(), |_| detail.total_votes().to_string()),
        ],
    }
}

fn pending_cells(label: &str) -> Vec<String> {
    vec![label.to_string(), String::new(), String::new(), String::new()]
}

fn room_status(detail: &PartialRoomDetail) -> &'static str {
    match (detail.is_active, detail.voting_started, detail.voting_ended) {
        (Some(false), _, _) => "Inactive",
        (_, _, Some(true)) => "Ended",
        (_, Some(true), _) => "Voting open",
        (_, Some(false), _) => "Not started",
        _ => UNKNOWN,
    }
}

/// Shared frame for every room view: header lines, then the view's own lines once
/// anything about the room is known.
fn room_lines(
    snap: &AppSnapshot,
    body: impl FnOnce(&PartialRoomDetail, &mut Vec<Line<'static>>),
) -> Vec<Line<'static>> {
    let Some(room) = &snap.room else {
        return vec![Line::from("No room selected.")];
    };
    let mut lines = vec![Line::from(vec![
        Span::styled(
            room.display_name().unwrap_or(UNKNOWN).to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!("  {}", room.address)),
    ])];
    match (&room.detail, &room.status) {
        (None, FetchStatus::Failed(err)) => {
            lines.push(Line::styled(
                format!("Room unavailable: {err}"),
                Style::default().fg(Color::Red),
            ));
        }
        (None, _) => lines.push(Line::from("Loading room...")),
        (Some(detail), status) => {
            if let FetchStatus::Failed(err) = status {
                lines.push(Line::styled(
                    format!("Showing the last known state; refresh failed: {err}"),
                    Style::default().fg(Color::Yellow),
                ));
            }
            let missing = detail.missing_fields();
            if !missing.is_empty() {
                lines.push(Line::styled(
                    format!(
                        "Some details could not be read: {}",
                        missing.iter().map(|field| field.label()).join(", ")
                    ),
                    Style::default().fg(Color::DarkGray),
                ));
            }
            lines.push(Line::from(format!(
                "Status: {}",
                room_status(detail)
            )));
            lines.push(Line::from(""));
            body(detail, &mut lines);
        }
    }
    lines
}

fn interact_lines(
    state: &UiState,
    snap: &AppSnapshot,
    detail: &PartialRoomDetail,
    lines: &mut Vec<Line<'static>>,
) {
    if let Some(description) = &detail.description {
        lines.push(Line::from(description.clone()));
        lines.push(Line::from(""));
    }
    if !snap.session.is_connected() {
        lines.push(Line::from("Connect your wallet (c) to vote."));
    } else if !snap.permissions.is_voter {
        lines.push(Line::styled(
            "You are not registered as a voter in this room.",
            Style::default().fg(Color::Yellow),
        ));
    } else if !detail.voting_open() {
        lines.push(Line::from("Voting is not open."));
    } else {
        lines.push(Line::from("Select a candidate and press Enter to vote."));
    }
    lines.push(Line::from(""));
    let Some(candidates) = &detail.candidates else {
        lines.push(Line::from(format!("Candidates: {UNKNOWN}")));
        return;
    };
    if candidates.is_empty() {
        lines.push(Line::from("No candidates yet."));
        return;
    }
    let mut candidates = candidates.clone();
    sort_candidates(&mut candidates);
    for (i, candidate) in candidates.iter().enumerate() {
        let cursor = if i == state.selected { ">" } else { " " };
        let text = format!(
            "{cursor} {:<width$} {:>5} votes",
            truncate(&candidate.name, NAME_WIDTH),
            candidate.vote_count,
            width = NAME_WIDTH
        );
        if i == state.selected {
            lines.push(Line::styled(
                text,
                Style::default().add_modifier(Modifier::REVERSED),
            ));
        } else {
            lines.push(Line::from(text));
        }
    }
}

fn detail_lines(snap: &AppSnapshot, detail: &PartialRoomDetail, lines: &mut Vec<Line<'static>>) {
    let account = |value: Option<&Account>| value.map_or_else(|| UNKNOWN.to_string(), Account::to_string);
    let flag = |value: Option<bool>| match value {
        Some(true) => "yes",
        Some(false) => "no",
        None => UNKNOWN,
    };
    lines.push(Line::from(format!(
        "Description: {}",
        detail.description.as_deref().unwrap_or(UNKNOWN)
    )));
    lines.push(Line::from(format!("Room admin: {}", account(detail.room_admin.as_ref()))));
    lines.push(Line::from(format!("Super admin: {}", account(detail.super_admin.as_ref()))));
    lines.push(Line::from(format!("Factory: {}", account(detail.factory.as_ref()))));
    lines.push(Line::from(format!(
        "Active: {} | Voting started: {} | Voting ended: {}",
        flag(detail.is_active),
        flag(detail.voting_started),
        flag(detail.voting_ended)
    )));
    let voters = detail
        .voters
        .as_ref()
        .map_or_else(|| UNKNOWN.to_string(), |v| v.len().to_string());
    let max = detail
        .max_voters
        .map_or_else(|| UNKNOWN.to_string(), |m| m.to_string());
    lines.push(Line::from(format!("Voters: {voters} of {max}")));
    lines.push(Line::from(""));
    if snap.permissions.can_manage() {
        lines.push(Line::styled(
            "s start | e end | + candidate | V voter | - remove voter | t transfer admin",
            Style::default().fg(Color::Cyan),
        ));
        lines.push(Line::styled(
            "R reset | C clear votes | K clear candidates | X deactivate",
            Style::default().fg(Color::Cyan),
        ));
    } else if snap.session.role.is_factory_admin() {
        lines.push(Line::styled(
            "As a factory admin you may R reset, X deactivate or t transfer this room.",
            Style::default().fg(Color::Cyan),
        ));
    } else {
        lines.push(Line::styled(
            "Only the room admin or super admin can manage this room.",
            Style::default().fg(Color::DarkGray),
        ));
    }
}

fn members_lines(detail: &PartialRoomDetail, lines: &mut Vec<Line<'static>>) {
    lines.push(Line::styled(
        "Candidates",
        Style::default().add_modifier(Modifier::BOLD),
    ));
    match &detail.candidates {
        None => lines.push(Line::from(format!("  {UNKNOWN}"))),
        Some(candidates) if candidates.is_empty() => lines.push(Line::from("  None")),
        Some(candidates) => {
            let total = detail.total_votes();
            let mut candidates = candidates.clone();
            sort_candidates(&mut candidates);
            for candidate in &candidates {
                lines.push(Line::from(format!(
                    "  {:<width$} {:>5} votes {:>3}%",
                    truncate(&candidate.name, NAME_WIDTH),
                    candidate.vote_count,
                    vote_share_percent(candidate.vote_count, total),
                    width = NAME_WIDTH
                )));
            }
        }
    }
    lines.push(Line::from(""));
    lines.push(Line::styled(
        "Voters",
        Style::default().add_modifier(Modifier::BOLD),
    ));
    match &detail.voters {
        None => lines.push(Line::from(format!("  {UNKNOWN}"))),
        Some(voters) if voters.is_empty() => lines.push(Line::from("  None")),
        Some(voters) => {
            let mut voters = voters.clone();
            sort_voters(&mut voters);
            for voter in &voters {
                lines.push(Line::from(format!(
                    "  {:<width$} {}",
                    truncate(&voter.name, NAME_WIDTH),
                    voter.address,
                    width = NAME_WIDTH
                )));
            }
        }
    }
}

fn admin_lines(snap: &AppSnapshot) -> Vec<Line<'static>> {
    let admins = &snap.factory_admins;
    let mut lines = Vec::new();
    if let FetchStatus::Failed(err) = &admins.status {
        lines.push(Line::styled(
            format!("Could not read factory admins: {err}"),
            Style::default().fg(Color::Red),
        ));
    }
    lines.push(Line::from(format!(
        "Creator: {}",
        admins
            .creator
            .map_or_else(|| UNKNOWN.to_string(), |c| c.to_string())
    )));
    let super_admins = match &admins.super_admins {
        None => UNKNOWN.to_string(),
        Some(list) if list.is_empty() => String::from("none"),
        Some(list) => list.iter().map(Account::short).join(", "),
    };
    lines.push(Line::from(format!("Super admins: {super_admins}")));
    lines.push(Line::from(""));
    if snap.session.role.is_factory_admin() {
        lines.push(Line::styled(
            "+ add super admin | - remove super admin | D deactivate and delete room",
            Style::default().fg(Color::Cyan),
        ));
        if snap.session.role == voting_client::Role::Creator {
            lines.push(Line::styled(
                "T transfer creator | F factory reset",
                Style::default().fg(Color::Cyan),
            ));
        }
    } else {
        lines.push(Line::styled(
            "Factory administration requires the creator or a super admin.",
            Style::default().fg(Color::DarkGray),
        ));
    }
    lines
}

fn draw_bottom(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(4)])
        .split(area);

    let status_widget = if snap.errors.is_empty() {
        let mut lines: Vec<Line> = Vec::new();
        if snap.status.trim().is_empty() {
            lines.push(Line::from("Ready"));
        } else {
            for line in snap.status.lines() {
                lines.push(Line::from(line.to_string()));
            }
        }
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Status"))
            .style(Style::default().fg(Color::Green))
    } else {
        let lines: Vec<Line> = snap
            .errors
            .iter()
            .rev()
            .map(|e| Line::from(e.clone()))
            .collect();
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Errors"))
            .style(Style::default().fg(Color::Red))
    };
    f.render_widget(status_widget, chunks[0]);

    let help = Paragraph::new(help_text(snap.page))
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, chunks[1]);
}

fn help_text(page: Page) -> &'static str {
    match page {
        Page::Home | Page::MyRooms => {
            "↑/↓ select | Enter vote | d details | v members | r refresh | n create | j join | Esc back | c connect | w switch | x disconnect | q quit"
        }
        Page::RoomInteract | Page::RoomDetail | Page::RoomMembers => {
            "i vote | d details | v members | ↑/↓ + Enter vote | r refresh | Esc back | c connect | w switch | x disconnect | q quit"
        }
        Page::AdminPanel => "r refresh | Esc back | h rooms | c connect | w switch | x disconnect | q quit",
        _ => "h rooms | m my rooms | n create | j join | a admin | c connect | w switch | x disconnect | q quit",
    }
}

fn draw_modals(f: &mut Frame, state: &UiState) {
    match &state.mode {
        Mode::Form(form) => {
            let area = centered_rect(60, 40, f.area());
            let block = Block::default()
                .borders(Borders::ALL)
                .title(form.kind.title());
            let mut lines = Vec::new();
            for (i, (label, value)) in form.kind.fields().iter().zip(&form.values).enumerate() {
                let cursor = if i == form.focus { ">" } else { " " };
                let caret = if i == form.focus { "_" } else { "" };
                lines.push(Line::from(format!("{cursor} {label}: {value}{caret}")));
            }
            lines.push(Line::from(""));
            lines.push(Line::from("Enter=next/submit Tab=next field Esc=cancel"));
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(Paragraph::new(lines), block.inner(area));
        }
        Mode::Confirm(confirm) => {
            let area = centered_rect(50, 20, f.area());
            let block = Block::default().borders(Borders::ALL).title("Confirm");
            let p = Paragraph::new(format!("{} (Y/N)", confirm.prompt)).wrap(Wrap { trim: true });
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::QuitModal => {
            let area = centered_rect(40, 20, f.area());
            let block = Block::default().borders(Borders::ALL).title("Confirm Quit");
            let p = Paragraph::new("Quit? (Y/N)");
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::Normal => {}
    }
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    let vertical = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1]);

    vertical[1]
}

/// Cuts `text` to at most `max` terminal columns, marking the cut with an ellipsis.
fn truncate(text: &str, max: usize) -> String {
    let mut width = 0;
    let mut out = String::new();
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if width + w > max {
            out.pop();
            out.push('…');
            return out;
        }
        width += w;
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::client::FactoryAdmins;
    use crossterm::event::KeyModifiers;
    use ratatui::backend::TestBackend;
    use voting_client::{
        aggregator::RoomListing,
        room::{
            RoomPermissions,
            RoomSummary,
        },
        session::SessionState,
    };

    fn key(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn snapshot(page: Page, view: Option<View>) -> AppSnapshot {
        AppSnapshot {
            network: "Local (http://localhost:8545/)".to_string(),
            factory: Account::from_bytes([0xfa; 20]),
            session: SessionState::default(),
            wallet_label: None,
            has_wallet: false,
            page,
            view,
            listing: RoomListing::default(),
            listing_status: FetchStatus::Loading,
            room: None,
            permissions: RoomPermissions::default(),
            factory_admins: FactoryAdmins::default(),
            status: String::new(),
            errors: Vec::new(),
        }
    }

    fn listing(n: u8) -> RoomListing {
        RoomListing::new(
            (1..=n)
                .map(|i| RoomSummary {
                    address: Account::from_bytes([i; 20]),
                    room_name: format!("Room {i}"),
                    created_by: Account::from_bytes([0xaa; 20]),
                })
                .collect(),
        )
    }

    fn render(snap: &AppSnapshot) -> String {
        let mut terminal = Terminal::new(TestBackend::new(120, 40)).unwrap();
        let state = UiState::default();
        terminal.draw(|f| ui(f, &state, snap)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn interpret_event__quit_needs_confirmation() {
        // given
        let mut state = UiState::default();

        // when
        let first = interpret_event(&mut state, key(KeyCode::Char('q')));
        let second = interpret_event(&mut state, key(KeyCode::Char('y')));

        // then
        assert_eq!(first, Some(UserEvent::Redraw));
        assert_eq!(second, Some(UserEvent::Quit));
    }

    #[test]
    fn interpret_event__join_form__submits_typed_address() {
        // given
        let mut state = UiState::default();
        assert_eq!(
            interpret_event(&mut state, key(KeyCode::Char('j'))),
            Some(UserEvent::Navigate(Page::Join))
        );

        // when
        for c in "0xab".chars() {
            interpret_event(&mut state, key(KeyCode::Char(c)));
        }
        interpret_event(&mut state, key(KeyCode::Backspace));
        let submitted = interpret_event(&mut state, key(KeyCode::Enter));

        // then
        assert_eq!(
            submitted,
            Some(UserEvent::Submit {
                form: FormKind::JoinRoom,
                values: vec!["0xa".to_string()],
            })
        );
        assert_eq!(state.mode, Mode::Normal);
    }

    #[test]
    fn interpret_event__create_form__enter_walks_fields_before_submitting() {
        let mut state = UiState::default();
        interpret_event(&mut state, key(KeyCode::Char('n')));

        interpret_event(&mut state, key(KeyCode::Char('A')));
        assert_eq!(interpret_event(&mut state, key(KeyCode::Enter)), Some(UserEvent::Redraw));
        interpret_event(&mut state, key(KeyCode::Enter));
        interpret_event(&mut state, key(KeyCode::Char('3')));
        let submitted = interpret_event(&mut state, key(KeyCode::Enter));

        assert_eq!(
            submitted,
            Some(UserEvent::Submit {
                form: FormKind::CreateRoom,
                values: vec!["A".to_string(), String::new(), "3".to_string()],
            })
        );
    }

    #[test]
    fn interpret_event__listing_enter__opens_selected_room() {
        // given
        let mut state = UiState::default();
        let mut snap = snapshot(Page::Home, Some(View::Home));
        snap.listing = listing(3);
        sync_with_snapshot(&mut state, &snap);

        // when
        interpret_event(&mut state, key(KeyCode::Down));
        interpret_event(&mut state, key(KeyCode::Down));
        interpret_event(&mut state, key(KeyCode::Down));
        let opened = interpret_event(&mut state, key(KeyCode::Enter));

        // then
        assert_eq!(
            opened,
            Some(UserEvent::OpenRoom {
                index: 2,
                page: Page::RoomInteract,
            })
        );
    }

    #[test]
    fn interpret_event__empty_listing__enter_does_nothing() {
        let mut state = UiState::default();
        sync_with_snapshot(&mut state, &snapshot(Page::Home, Some(View::Home)));

        assert_eq!(interpret_event(&mut state, key(KeyCode::Enter)), None);
    }

    #[test]
    fn interpret_event__declined_confirmation__drops_action() {
        // given
        let mut state = UiState::default();
        let room = Account::from_bytes([1; 20]);
        sync_with_snapshot(&mut state, &snapshot(Page::RoomDetail, Some(View::RoomDetail(room))));
        interpret_event(&mut state, key(KeyCode::Char('e')));

        // when
        let declined = interpret_event(&mut state, key(KeyCode::Char('n')));

        // then
        assert_eq!(declined, Some(UserEvent::Redraw));
        assert_eq!(state.mode, Mode::Normal);
        interpret_event(&mut state, key(KeyCode::Char('e')));
        assert_eq!(
            interpret_event(&mut state, key(KeyCode::Char('y'))),
            Some(UserEvent::Room(RoomAction::EndVote))
        );
    }

    #[test]
    fn sync_with_snapshot__view_change__resets_selection() {
        let mut state = UiState::default();
        let mut snap = snapshot(Page::Home, Some(View::Home));
        snap.listing = listing(3);
        sync_with_snapshot(&mut state, &snap);
        state.selected = 2;

        snap.page = Page::MyRooms;
        snap.view = Some(View::MyRooms);
        sync_with_snapshot(&mut state, &snap);

        assert_eq!(state.selected, 0);
    }

    #[test]
    fn room_status__unknown_fields__render_placeholder() {
        assert_eq!(room_status(&PartialRoomDetail::default()), UNKNOWN);
        let closed = PartialRoomDetail {
            is_active: Some(true),
            voting_started: Some(true),
            voting_ended: Some(true),
            ..Default::default()
        };
        assert_eq!(room_status(&closed), "Ended");
    }

    #[test]
    fn truncate__wide_text__fits_width() {
        assert_eq!(truncate("Board", 10), "Board");
        assert_eq!(truncate("Annual board election", 10), "Annual bo…");
        assert_eq!(truncate("投票投票投票", 6), "投票…");
    }

    #[test]
    fn ui__landing_without_wallet__prompts_for_keystore() {
        let rendered = render(&snapshot(Page::Landing, Some(View::Landing)));

        assert!(rendered.contains("No wallet detected"));
    }

    #[test]
    fn ui__listing_row_without_detail__shows_loading() {
        let mut snap = snapshot(Page::Home, Some(View::Home));
        snap.listing = listing(1);
        snap.listing_status = FetchStatus::Ready;

        let rendered = render(&snap);

        assert!(rendered.contains("Room 1"));
        assert!(rendered.contains("loading..."));
    }

    #[test]
    fn ui__errors__replace_status_panel() {
        let mut snap = snapshot(Page::Landing, Some(View::Landing));
        snap.errors = vec!["invalid input: bad address".to_string()];

        let rendered = render(&snap);

        assert!(rendered.contains("Errors"));
        assert!(rendered.contains("bad address"));
    }
}
