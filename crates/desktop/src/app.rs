//! Ollama Chat Desktop: egui app state and UI.

use eframe::egui;
use lib::api::{Backend, BackendError, WhoAmI};
use lib::dispatch::{Dispatcher, SendOutcome, SendRejected};
use lib::poller::StatusPoller;
use lib::status::StatusSnapshot;
use lib::store::{ChatStore, Message, MessageKind, ThreadId};
use lib::view::{self, EmptyState};
use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::Arc;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

const INPUT_ROW_HEIGHT: f32 = 36.0;
const CHAT_MESSAGES_MIN_HEIGHT: f32 = 80.0;
const SIDEBAR_WIDTH: f32 = 240.0;
const SIDEBAR_COLLAPSED_WIDTH: f32 = 48.0;
const LOG_BUFFER_MAX_LINES: usize = 2000;

/// How often to repaint without input so poll and send results show up.
const IDLE_REPAINT: Duration = Duration::from_millis(250);

/// Ring buffer of log lines for the Logs screen. Written by DesktopLogger.
static LOG_LINES: OnceLock<Mutex<VecDeque<String>>> = OnceLock::new();

fn log_buffer() -> &'static Mutex<VecDeque<String>> {
    LOG_LINES.get_or_init(|| Mutex::new(VecDeque::new()))
}

fn push_log_line(line: String) {
    if let Ok(mut buf) = log_buffer().lock() {
        buf.push_back(line);
        while buf.len() > LOG_BUFFER_MAX_LINES {
            buf.pop_front();
        }
    }
}

/// Logger that appends to LOG_LINES for display in the Logs screen.
struct DesktopLogger;

impl log::Log for DesktopLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        // Keep HTTP stack chatter out of the Logs screen.
        !metadata.target().starts_with("hyper") && !metadata.target().starts_with("reqwest")
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!(
            "{} [{}] {}",
            utc_time_of_day(),
            record.level(),
            record.args()
        );
        push_log_line(line);
    }

    fn flush(&self) {}
}

/// Wall-clock time of day in UTC, e.g. `14:03:07.251Z`.
fn utc_time_of_day() -> String {
    let since_epoch = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let day_secs = since_epoch.as_secs() % 86_400;
    format!(
        "{:02}:{:02}:{:02}.{:03}Z",
        day_secs / 3600,
        (day_secs / 60) % 60,
        day_secs % 60,
        since_epoch.subsec_millis()
    )
}

static LOGGER: DesktopLogger = DesktopLogger;

/// Install the in-process logger. Safe to call more than once.
pub fn install_logger() {
    let _ = LOG_LINES.get_or_init(|| Mutex::new(VecDeque::new()));
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(log::LevelFilter::Debug);
}

#[derive(Clone, Copy, PartialEq, Eq, Default)]
enum Screen {
    #[default]
    Chat,
    Logs,
}

/// Sidebar clicks, applied after the list is drawn.
enum SidebarAction {
    New,
    Select(ThreadId),
    Delete(ThreadId),
    StartRename(ThreadId),
    CommitRename,
}

pub struct ChatApp {
    /// Dropped first so polling stops before the runtime shuts down.
    poller: Option<StatusPoller>,
    /// Runs the poller and backend requests off the UI thread.
    runtime: tokio::runtime::Runtime,
    backend: Arc<dyn Backend>,
    dispatcher: Dispatcher,
    store: ChatStore,
    /// Latest status snapshot from the poller.
    status: StatusSnapshot,
    /// Header label of the backend instance that last answered.
    current_backend: String,
    /// Current input text for the chat box.
    chat_input: String,
    /// When Some, a chat turn is in flight; we read the outcome here.
    chat_turn_receiver: Option<mpsc::Receiver<SendOutcome>>,
    /// When Some, a whoami request is in flight.
    whoami_receiver: Option<mpsc::Receiver<Result<WhoAmI, BackendError>>>,
    /// Text of the modal notice; the rest of the UI is disabled while it is shown.
    notice: Option<String>,
    /// Thread being renamed and its draft title.
    renaming: Option<(ThreadId, String)>,
    sidebar_collapsed: bool,
    current_screen: Screen,
}

impl ChatApp {
    /// Space between the screen title and the content below.
    const SCREEN_TITLE_BOTTOM_SPACING: f32 = 18.0;
    /// Space between the bottom of the content and the window edge.
    const SCREEN_FOOTER_SPACING: f32 = 24.0;

    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        runtime: tokio::runtime::Runtime,
        backend: Arc<dyn Backend>,
        poll_interval: Duration,
    ) -> Self {
        let poller = {
            let _guard = runtime.enter();
            StatusPoller::spawn(backend.clone(), poll_interval)
        };
        log::info!("desktop started");
        Self {
            poller: Some(poller),
            runtime,
            backend,
            dispatcher: Dispatcher::new(),
            store: ChatStore::new(),
            status: StatusSnapshot::checking(),
            current_backend: view::CONNECTING_LABEL.to_string(),
            chat_input: String::new(),
            chat_turn_receiver: None,
            whoami_receiver: None,
            notice: None,
            renaming: None,
            sidebar_collapsed: false,
            current_screen: Screen::default(),
        }
    }

    /// Pick up the latest poll result, if any. Call each frame.
    fn poll_status(&mut self) {
        let Some(poller) = self.poller.as_mut() else { return };
        if let Some(report) = poller.take_update() {
            if let Some(label) = report.backend_label() {
                self.current_backend = label;
            }
            if report.snapshot.state != self.status.state {
                log::info!("backend status: {} ({})", report.snapshot.state, report.snapshot.message);
            }
            self.status = report.snapshot;
        }
    }

    /// Poll for chat turn outcome and record it. Call each frame.
    fn poll_chat_turn(&mut self) {
        if let Some(rx) = &self.chat_turn_receiver {
            match rx.try_recv() {
                Ok(outcome) => {
                    self.chat_turn_receiver = None;
                    if let Some(label) = self.dispatcher.complete(&mut self.store, outcome) {
                        self.current_backend = label;
                    }
                }
                Err(mpsc::TryRecvError::Empty) => {}
                Err(mpsc::TryRecvError::Disconnected) => {
                    // Task ended without an outcome; its guard already released the busy flag.
                    self.chat_turn_receiver = None;
                }
            }
        }
    }

    /// Poll for a whoami result and turn it into the modal notice. Call each frame.
    fn poll_whoami(&mut self) {
        if let Some(rx) = &self.whoami_receiver {
            match rx.try_recv() {
                Ok(result) => {
                    self.whoami_receiver = None;
                    if let Ok(ref who) = result {
                        self.current_backend = view::backend_label(who.instance_id.as_deref());
                    }
                    self.notice = Some(view::whoami_notice(&result));
                }
                Err(mpsc::TryRecvError::Empty) => {}
                Err(mpsc::TryRecvError::Disconnected) => self.whoami_receiver = None,
            }
        }
    }

    /// Start a chat turn on the runtime if the dispatcher accepts it.
    fn start_chat_turn(&mut self) {
        if self.chat_turn_receiver.is_some() {
            return;
        }
        let thread_id = self.store.active_id();
        match self
            .dispatcher
            .begin(&mut self.store, &self.status, thread_id, &self.chat_input)
        {
            Ok(pending) => {
                self.chat_input.clear();
                let backend = self.backend.clone();
                let (tx, rx) = mpsc::channel();
                self.runtime.spawn(async move {
                    let outcome = pending.run(backend.as_ref()).await;
                    let _ = tx.send(outcome);
                });
                self.chat_turn_receiver = Some(rx);
            }
            Err(SendRejected::EmptyPrompt) => {}
            Err(e) => log::info!("message not sent: {}", e),
        }
    }

    fn find_my_ip(&mut self) {
        if self.whoami_receiver.is_some() {
            return;
        }
        let backend = self.backend.clone();
        let (tx, rx) = mpsc::channel();
        self.runtime.spawn(async move {
            let _ = tx.send(backend.whoami().await);
        });
        self.whoami_receiver = Some(rx);
    }

    fn apply_sidebar_action(&mut self, action: SidebarAction) {
        match action {
            SidebarAction::New => {
                self.store.create_thread();
                self.renaming = None;
            }
            SidebarAction::Select(id) => {
                self.store.select_thread(id);
            }
            SidebarAction::Delete(id) => {
                self.store.delete_thread(id);
                if matches!(self.renaming, Some((r, _)) if r == id) {
                    self.renaming = None;
                }
            }
            SidebarAction::StartRename(id) => {
                if let Some(t) = self.store.thread(id) {
                    self.renaming = Some((id, t.title.clone()));
                }
            }
            SidebarAction::CommitRename => {
                if let Some((id, title)) = self.renaming.take() {
                    self.store.rename_thread(id, &title);
                }
            }
        }
    }

    /// Renders a single message: role-based fill, error text in red, instance under replies.
    fn render_chat_message(ui: &mut egui::Ui, m: &Message) {
        let visuals = &ui.style().visuals;
        let fill = match m.kind {
            MessageKind::User => visuals.extreme_bg_color,
            MessageKind::Assistant => visuals.panel_fill,
            MessageKind::Error => visuals.faint_bg_color,
        };
        let frame = egui::Frame::none()
            .fill(fill)
            .stroke(egui::Stroke::new(
                1.0,
                visuals.widgets.noninteractive.bg_stroke.color,
            ))
            .rounding(egui::Rounding::same(8.0))
            .inner_margin(egui::Margin::same(8.0));

        frame.show(ui, |ui| match m.kind {
            MessageKind::User => {
                ui.label(egui::RichText::new(&m.text).strong());
            }
            MessageKind::Assistant => {
                ui.label(&m.text);
            }
            MessageKind::Error => {
                ui.colored_label(egui::Color32::RED, &m.text);
            }
        });
        if let Some(ref instance) = m.source_instance {
            ui.label(
                egui::RichText::new(format!("Instance: {}", instance))
                    .small()
                    .weak(),
            );
        }
    }

    fn ui_empty_state(ui: &mut egui::Ui, state: EmptyState<'_>) {
        ui.vertical_centered(|ui| {
            ui.add_space(48.0);
            match state {
                EmptyState::Waiting { message, hint } => {
                    ui.spinner();
                    ui.add_space(8.0);
                    ui.label(message);
                    if let Some(hint) = hint {
                        ui.label(egui::RichText::new(hint).weak());
                    }
                }
                EmptyState::NoMessages => {
                    ui.label(EmptyState::NO_MESSAGES_TEXT);
                }
            }
        });
    }

    /// Render the chat UI (messages + input). Messages fill the space above a fixed input row.
    fn ui_chat(&mut self, ui: &mut egui::Ui) {
        let busy = self.dispatcher.is_busy();
        let input = view::input_state(&self.status, busy);

        let available = ui.available_height();
        let bottom_section_height = INPUT_ROW_HEIGHT + 8.0 + Self::SCREEN_FOOTER_SPACING;
        let messages_height = (available - bottom_section_height).max(CHAT_MESSAGES_MIN_HEIGHT);
        let messages_rect = ui
            .allocate_exact_size(
                egui::vec2(ui.available_width(), messages_height),
                egui::Sense::hover(),
            )
            .0;
        let mut messages_ui = ui.child_ui(messages_rect, egui::Layout::top_down(egui::Align::Min));
        let thread = self.store.active_thread();
        match view::empty_state(&self.status, thread) {
            Some(state) => Self::ui_empty_state(&mut messages_ui, state),
            None => {
                egui::ScrollArea::vertical()
                    .stick_to_bottom(true)
                    .auto_shrink([false; 2])
                    .show(&mut messages_ui, |ui| {
                        for m in &thread.messages {
                            Self::render_chat_message(ui, m);
                            ui.add_space(8.0);
                        }
                    });
            }
        }

        ui.add_space(8.0);

        let mut send_now = false;
        ui.horizontal(|ui| {
            let button_width = 72.0;
            let response = ui.add_enabled(
                input.enabled,
                egui::TextEdit::singleline(&mut self.chat_input)
                    .hint_text(input.placeholder)
                    .desired_width(ui.available_width() - button_width),
            );
            if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                send_now = true;
                response.request_focus();
            }
            if busy {
                ui.spinner();
            } else {
                let enabled = view::can_submit(&self.status, busy, &self.chat_input);
                if ui.add_enabled(enabled, egui::Button::new("Send")).clicked() {
                    send_now = true;
                }
            }
        });
        if send_now {
            self.start_chat_turn();
        }
        ui.add_space(Self::SCREEN_FOOTER_SPACING);
    }

    fn ui_sidebar(&mut self, ui: &mut egui::Ui) {
        let mut action = None;
        ui.add_space(16.0);
        if self.sidebar_collapsed {
            if ui.button("+").on_hover_text("New Chat").clicked() {
                action = Some(SidebarAction::New);
            }
            ui.add_space(8.0);
            if ui.button("▶").on_hover_text("Show chats").clicked() {
                self.sidebar_collapsed = false;
            }
        } else {
            ui.horizontal(|ui| {
                if ui.button("+ New Chat").clicked() {
                    action = Some(SidebarAction::New);
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("◀").on_hover_text("Hide chats").clicked() {
                        self.sidebar_collapsed = true;
                    }
                });
            });
            ui.add_space(12.0);
            egui::ScrollArea::vertical().show(ui, |ui| {
                let active = self.store.active_id();
                for t in self.store.threads() {
                    ui.horizontal(|ui| {
                        match self.renaming {
                            Some((id, ref mut draft)) if id == t.id => {
                                let response = ui.text_edit_singleline(draft);
                                if response.lost_focus() {
                                    action = Some(SidebarAction::CommitRename);
                                } else {
                                    response.request_focus();
                                }
                            }
                            _ => {
                                let response = ui
                                    .selectable_label(t.id == active, &t.title)
                                    .on_hover_text("Double-click to rename");
                                if response.double_clicked() {
                                    action = Some(SidebarAction::StartRename(t.id));
                                } else if response.clicked() {
                                    action = Some(SidebarAction::Select(t.id));
                                }
                            }
                        }
                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                            if ui.small_button("🗑").on_hover_text("Delete chat").clicked() {
                                action = Some(SidebarAction::Delete(t.id));
                            }
                        });
                    });
                    ui.add_space(4.0);
                }
            });
        }
        if let Some(action) = action {
            self.apply_sidebar_action(action);
        }
    }

    fn ui_logs_screen(&self, ui: &mut egui::Ui) {
        ui.add_space(24.0);
        ui.heading("Logs");
        ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);
        let lines: Vec<String> = log_buffer()
            .lock()
            .map(|buf| buf.iter().cloned().collect())
            .unwrap_or_default();
        egui::ScrollArea::vertical()
            .stick_to_bottom(true)
            .auto_shrink([false; 2])
            .show(ui, |ui| {
                if lines.is_empty() {
                    ui.label("No log output yet.");
                }
                for line in &lines {
                    ui.label(
                        egui::RichText::new(line.as_str()).family(egui::FontFamily::Monospace),
                    );
                }
            });
    }

    fn ui_notice(&mut self, ctx: &egui::Context) {
        let Some(text) = self.notice.clone() else { return };
        let mut close = false;
        egui::Window::new("Find My IP")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(text);
                ui.add_space(8.0);
                if ui.button("OK").clicked() {
                    close = true;
                }
            });
        if close {
            self.notice = None;
        }
    }
}

impl eframe::App for ChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_status();
        self.poll_chat_turn();
        self.poll_whoami();
        ctx.request_repaint_after(IDLE_REPAINT);

        let modal = self.notice.is_some();

        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.set_enabled(!modal);
            egui::Frame::none()
                .inner_margin(egui::Margin::symmetric(24.0, 0.0))
                .show(ui, |ui| {
                    ui.add_space(12.0);
                    ui.horizontal(|ui| {
                        ui.vertical(|ui| {
                            ui.heading("Ollama Chat");
                            let mut subtitle = format!("Backend: {}", self.current_backend);
                            if let Some(ref model) = self.status.model {
                                subtitle.push_str(&format!("  ·  Model: {}", model));
                            }
                            ui.label(egui::RichText::new(subtitle).weak());
                        });
                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                            let looking_up = self.whoami_receiver.is_some();
                            if ui
                                .add_enabled(!looking_up, egui::Button::new("Find My IP"))
                                .clicked()
                            {
                                self.find_my_ip();
                            }
                            ui.add_space(12.0);
                            if ui
                                .selectable_label(self.current_screen == Screen::Logs, "Logs")
                                .clicked()
                            {
                                self.current_screen = Screen::Logs;
                            }
                            if ui
                                .selectable_label(self.current_screen == Screen::Chat, "Chat")
                                .clicked()
                            {
                                self.current_screen = Screen::Chat;
                            }
                        });
                    });
                    ui.add_space(12.0);
                });
        });

        let sidebar_width = if self.sidebar_collapsed {
            SIDEBAR_COLLAPSED_WIDTH
        } else {
            SIDEBAR_WIDTH
        };
        egui::SidePanel::left("sidebar")
            .resizable(false)
            .exact_width(sidebar_width)
            .show(ctx, |ui| {
                ui.set_enabled(!modal);
                self.ui_sidebar(ui);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.set_enabled(!modal);
            egui::Frame::none()
                .inner_margin(egui::Margin::symmetric(24.0, 0.0))
                .show(ui, |ui| match self.current_screen {
                    Screen::Chat => {
                        ui.add_space(16.0);
                        self.ui_chat(ui);
                    }
                    Screen::Logs => self.ui_logs_screen(ui),
                });
        });

        self.ui_notice(ctx);
    }
}

impl Drop for ChatApp {
    fn drop(&mut self) {
        if self.poller.take().is_some() {
            log::info!("desktop closing; status polling stopped");
        }
    }
}
