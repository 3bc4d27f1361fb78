use crate::chat::client::ChatClient;
use crate::chat::ChatMode;
use crate::checkin::{Checkin, Notice, NoticeKind};
use crate::config::{AppConfig, Region};
use crate::event::AppEvent;
use crate::identity::Session;
use crate::places::{PlaceDraft, PlaceId};
use crate::theme::Theme;
use eframe::egui::{self, Align2, RichText, ScrollArea};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, warn};

const TOAST_SECONDS: f64 = 4.0;
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Default)]
struct PlaceForm {
    name: String,
    description: String,
    image_url: String,
    image_path: String,
    initial_comment: String,
}

#[derive(Default)]
struct LoginForm {
    username: String,
    password: String,
    google_token: String,
}

/// Text buffers and transient view state. Domain state lives in `Checkin`.
#[derive(Default)]
struct ViewState {
    chat_input: String,
    peer_target: String,
    document_path: String,
    jump_input: String,
    comment_input: String,
    place_form: PlaceForm,
    login_form: LoginForm,
    show_landing: bool,
    active_alert: Option<String>,
    toasts: Vec<(String, f64)>,
    scroll_chat: bool,
}

pub struct DakaApp {
    rx: Receiver<AppEvent>,
    tx: mpsc::Sender<AppEvent>,
    runtime_handle: Handle,
    config: AppConfig,
    device_id: String,
    chat: ChatClient,
    theme: Theme,
    visuals_applied: bool,
    checkin: Option<Checkin>,
    view: ViewState,
}

impl DakaApp {
    pub fn new(
        rx: Receiver<AppEvent>,
        tx: mpsc::Sender<AppEvent>,
        runtime_handle: Handle,
        config: AppConfig,
        device_id: String,
        chat: ChatClient,
    ) -> Self {
        let mut app = Self {
            rx,
            tx,
            runtime_handle,
            device_id,
            chat,
            theme: Theme::default(),
            visuals_applied: false,
            checkin: None,
            view: ViewState::default(),
            config,
        };
        if let Some(region) = app.config.region {
            app.enter_region(region);
        }
        app
    }

    fn enter_region(&mut self, region: Region) {
        let checkin = Checkin::open(
            self.config.clone(),
            region,
            Session::anonymous(self.device_id.clone()),
            self.chat.clone(),
            self.runtime_handle.clone(),
            self.tx.clone(),
        );
        self.view.show_landing = region.supports_sign_in();
        self.checkin = Some(checkin);
    }

    fn drain_events(&mut self, ctx: &egui::Context) {
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    if let Some(checkin) = self.checkin.as_mut() {
                        checkin.handle_event(event);
                        self.view.scroll_chat = true;
                        ctx.request_repaint();
                    } else {
                        debug!(?event, "dropping event before a region was chosen");
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    warn!("event channel disconnected");
                    break;
                }
            }
        }
    }

    fn collect_notices(&mut self, ctx: &egui::Context) {
        let now = ctx.input(|i| i.time);
        self.view.toasts.retain(|(_, expires)| *expires > now);
        let Some(checkin) = self.checkin.as_mut() else {
            return;
        };
        while self.view.active_alert.is_none() {
            match checkin.pop_notice() {
                Some(Notice {
                    kind: NoticeKind::Alert,
                    text,
                }) => self.view.active_alert = Some(text),
                Some(Notice {
                    kind: NoticeKind::Toast,
                    text,
                }) => self.view.toasts.push((text, now + TOAST_SECONDS)),
                None => break,
            }
        }
    }

    fn render_region_select(&mut self, ctx: &egui::Context) {
        let mut chosen = None;
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(ui.available_height() / 3.0);
                ui.heading("Daka Map");
                ui.label(RichText::new("Choose your region").color(self.theme.text_muted));
                ui.add_space(self.theme.spacing_16);
                for region in Region::ALL {
                    if ui
                        .add_sized([220.0, self.theme.button_height], egui::Button::new(region.label()))
                        .clicked()
                    {
                        chosen = Some(region);
                    }
                }
            });
        });
        if let Some(region) = chosen {
            self.enter_region(region);
        }
    }
}

/// One frame's borrow of the session, the view buffers and the theme.
struct CheckinView<'a> {
    checkin: &'a mut Checkin,
    view: &'a mut ViewState,
    theme: &'a Theme,
}

impl CheckinView<'_> {
    fn render_landing(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(ui.available_height() / 5.0);
                ui.heading("Daka Map");
                ui.label(
                    RichText::new("Check in at the places you love")
                        .color(self.theme.text_muted),
                );
                ui.add_space(self.theme.spacing_16);

                self.theme.card_frame().show(ui, |ui| {
                    ui.set_max_width(320.0);
                    let form = &mut self.view.login_form;
                    ui.add(egui::TextEdit::singleline(&mut form.username).hint_text("Username"));
                    ui.add(
                        egui::TextEdit::singleline(&mut form.password)
                            .password(true)
                            .hint_text("Password"),
                    );
                    ui.horizontal(|ui| {
                        if ui.button("Sign in").clicked()
                            && self.checkin.login(&form.username, &form.password)
                        {
                            form.password.clear();
                            self.view.show_landing = false;
                        }
                        if ui.button("Register").clicked() {
                            self.checkin.register(&form.username, &form.password);
                        }
                    });

                    ui.separator();
                    ui.add(
                        egui::TextEdit::singleline(&mut form.google_token)
                            .hint_text("Google ID token"),
                    );
                    if ui.button("Sign in with Google").clicked()
                        && self.checkin.sign_in_with_google(form.google_token.trim())
                    {
                        form.google_token.clear();
                        self.view.show_landing = false;
                    }
                });

                ui.add_space(self.theme.spacing_8);
                if ui.link("Continue without signing in").clicked() {
                    self.view.show_landing = false;
                }
            });
        });
    }

    fn render_top_bar(&mut self, ctx: &egui::Context, switch_to: &mut Option<Region>) {
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.strong("Daka Map");
                ui.separator();
                let current = self.checkin.region();
                egui::ComboBox::from_id_salt("region")
                    .selected_text(current.label())
                    .show_ui(ui, |ui| {
                        for region in Region::ALL {
                            if ui.selectable_label(region == current, region.label()).clicked() {
                                *switch_to = Some(region);
                            }
                        }
                    });
                ui.separator();

                let response = ui.add(
                    egui::TextEdit::singleline(&mut self.view.jump_input)
                        .desired_width(220.0)
                        .hint_text("Search a place..."),
                );
                let submitted = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                if ui.button("Go").clicked() || submitted {
                    self.checkin.jump_to(&self.view.jump_input);
                }
                if ui.button("My location").clicked() {
                    self.checkin.center_on_user();
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if self.checkin.session().is_signed_in() {
                        if ui.button("Sign out").clicked() {
                            self.checkin.sign_out();
                        }
                    } else if self.checkin.region().supports_sign_in()
                        && ui.button("Sign in").clicked()
                    {
                        self.view.show_landing = true;
                    }
                    ui.label(self.checkin.session().display_name());
                });
            });
        });
    }

    fn render_chat_panel(&mut self, ctx: &egui::Context) {
        egui::SidePanel::left("chat_panel")
            .resizable(true)
            .default_width(340.0)
            .show(ctx, |ui| {
                let mut mode = self.checkin.transcript().mode();
                ui.horizontal(|ui| {
                    ui.selectable_value(&mut mode, ChatMode::Assistant, "Daka AI");
                    ui.selectable_value(&mut mode, ChatMode::Peer, "Friends");
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.small_button("Clear").clicked() {
                            self.checkin.clear_chat();
                        }
                    });
                });
                if mode != self.checkin.transcript().mode() {
                    self.checkin.set_chat_mode(mode);
                }

                if mode == ChatMode::Peer {
                    let response = ui.add(
                        egui::TextEdit::singleline(&mut self.view.peer_target)
                            .desired_width(f32::INFINITY)
                            .hint_text("Chat with (their id)"),
                    );
                    if response.changed() {
                        self.checkin.set_peer_target(&self.view.peer_target);
                    }
                    ui.label(
                        RichText::new(format!("You are {}", self.checkin.peer_identity()))
                            .color(self.theme.text_muted)
                            .size(12.0),
                    );
                }
                ui.separator();

                let transcript_height = (ui.available_height() - 130.0).max(120.0);
                ScrollArea::vertical()
                    .id_salt("chat_transcript")
                    .max_height(transcript_height)
                    .stick_to_bottom(true)
                    .show(ui, |ui| {
                        let me = self.checkin.peer_identity();
                        let messages = match mode {
                            ChatMode::Assistant => self.checkin.transcript().assistant_messages(),
                            ChatMode::Peer => self.checkin.transcript().peer_conversation(&me),
                        };
                        for message in messages {
                            let color = if message.is_from_assistant() {
                                self.theme.accent_primary
                            } else {
                                self.theme.text_muted
                            };
                            ui.label(RichText::new(&message.sender).color(color).size(12.0));
                            ui.label(&message.text);
                            ui.add_space(self.theme.spacing_4);
                        }
                        if mode == ChatMode::Assistant && self.checkin.transcript().is_thinking() {
                            let thinking = RichText::new("Daka AI is thinking...");
                            ui.label(thinking.color(self.theme.text_muted));
                        }
                        if self.view.scroll_chat {
                            ui.scroll_to_cursor(Some(egui::Align::BOTTOM));
                        }
                    });
                self.view.scroll_chat = false;

                ui.separator();
                let mut send_now = false;
                self.theme.composer_frame().show(ui, |ui| {
                    ui.horizontal(|ui| {
                        let response = ui.add(
                            egui::TextEdit::singleline(&mut self.view.chat_input)
                                .desired_width(ui.available_width() - 60.0)
                                .hint_text("Type a message..."),
                        );
                        if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                            send_now = true;
                        }
                        send_now |= ui.button("Send").clicked();
                    });
                });
                if send_now && self.checkin.send_chat(&self.view.chat_input) {
                    self.view.chat_input.clear();
                    self.view.scroll_chat = true;
                }

                if mode == ChatMode::Assistant {
                    ui.horizontal(|ui| {
                        ui.add(
                            egui::TextEdit::singleline(&mut self.view.document_path)
                                .desired_width(ui.available_width() - 90.0)
                                .hint_text("Path to a .txt file"),
                        );
                        let has_path = !self.view.document_path.trim().is_empty();
                        if ui.button("Ask AI").clicked() && has_path {
                            let path = PathBuf::from(self.view.document_path.trim());
                            self.checkin.upload_document(&path);
                            self.view.document_path.clear();
                            self.view.scroll_chat = true;
                        }
                    });
                }
            });
    }

    fn render_place_panel(&mut self, ctx: &egui::Context) {
        egui::SidePanel::right("place_panel")
            .resizable(true)
            .default_width(300.0)
            .show(ctx, |ui| {
                let Some(place) = self.checkin.selected_place().cloned() else {
                    ui.heading("Places");
                    ui.label(
                        RichText::new("Click a pin for details, or click the map to check in somewhere new.")
                            .color(self.theme.text_muted),
                    );
                    ui.separator();
                    let mut focus: Option<PlaceId> = None;
                    ScrollArea::vertical().id_salt("place_list").show(ui, |ui| {
                        for place in self.checkin.places() {
                            if ui.link(&place.name).clicked() {
                                focus = Some(place.id);
                            }
                        }
                    });
                    if let Some(id) = focus {
                        self.checkin.focus_place(id);
                    }
                    return;
                };

                ui.horizontal(|ui| {
                    ui.heading(&place.name);
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.small_button("Close").clicked() {
                            self.checkin.close_place();
                        }
                    });
                });
                if !place.description.is_empty() {
                    ui.label(&place.description);
                }
                if place.image_url.starts_with("http") {
                    ui.hyperlink_to("Open photo", &place.image_url);
                } else if !place.image_url.is_empty() {
                    ui.label(RichText::new("Photo attached").color(self.theme.text_muted));
                }
                if !place.uploader.name.is_empty() {
                    ui.label(
                        RichText::new(format!("Added by {}", place.uploader.name))
                            .color(self.theme.text_muted)
                            .size(12.0),
                    );
                }
                ui.separator();

                ui.strong("Comments");
                let comments = self.checkin.comments(place.id);
                if comments.is_empty() {
                    ui.label(RichText::new("No comments yet").color(self.theme.text_muted));
                }
                for comment in comments {
                    self.theme.card_frame().show(ui, |ui| {
                        ui.set_width(ui.available_width());
                        ui.label(comment);
                    });
                }
                ui.horizontal(|ui| {
                    ui.add(
                        egui::TextEdit::singleline(&mut self.view.comment_input)
                            .desired_width(ui.available_width() - 70.0)
                            .hint_text("Say something..."),
                    );
                    if ui.button("Post").clicked()
                        && self.checkin.add_comment(place.id, &self.view.comment_input)
                    {
                        self.view.comment_input.clear();
                    }
                });

                if self.checkin.can_delete(place.id) {
                    ui.add_space(self.theme.spacing_16);
                    let label = RichText::new("Delete place").color(self.theme.text_on_accent);
                    let delete = egui::Button::new(label).fill(self.theme.danger);
                    if ui.add(delete).clicked() {
                        self.checkin.delete_place(place.id);
                    }
                }
            });
    }

    fn render_place_form(&mut self, ctx: &egui::Context) {
        let Some(location) = self.checkin.pending_location() else {
            return;
        };

        let dropped: Vec<PathBuf> = ctx.input(|i| {
            i.raw
                .dropped_files
                .iter()
                .filter_map(|file| file.path.clone())
                .collect()
        });
        if let Some(path) = dropped.first() {
            self.view.place_form.image_path = path.display().to_string();
        }

        let mut close = false;
        egui::Window::new("Check in here")
            .collapsible(false)
            .resizable(false)
            .anchor(Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                let form = &mut self.view.place_form;
                ui.label(
                    RichText::new(format!("{:.5}, {:.5}", location.lat, location.lng))
                        .color(self.theme.text_muted)
                        .size(12.0),
                );
                ui.add(egui::TextEdit::singleline(&mut form.name).hint_text("Place name"));
                ui.add(
                    egui::TextEdit::multiline(&mut form.description)
                        .desired_rows(3)
                        .hint_text("Description"),
                );
                ui.add(egui::TextEdit::singleline(&mut form.image_url).hint_text("Image URL"));
                ui.horizontal(|ui| {
                    ui.add(
                        egui::TextEdit::singleline(&mut form.image_path)
                            .hint_text("...or an image file (drop it here)"),
                    );
                    if ui.button("Load").clicked() && !form.image_path.trim().is_empty() {
                        let path = PathBuf::from(form.image_path.trim());
                        if let Some(url) = self.checkin.load_image(&path) {
                            form.image_url = url;
                        }
                    }
                });
                if form.image_url.starts_with("data:") {
                    ui.label(RichText::new("Image loaded").color(self.theme.success));
                }
                ui.add(
                    egui::TextEdit::singleline(&mut form.initial_comment)
                        .hint_text("First comment (optional)"),
                );

                ui.horizontal(|ui| {
                    if ui.button("Save").clicked() {
                        let draft = PlaceDraft {
                            name: form.name.clone(),
                            description: form.description.clone(),
                            image_url: form.image_url.clone(),
                            location: Some(location),
                            initial_comment: form.initial_comment.clone(),
                        };
                        close = self.checkin.submit_place(draft);
                    }
                    if ui.button("Cancel").clicked() {
                        self.checkin.cancel_pending_place();
                        close = true;
                    }
                });
            });
        if close {
            self.view.place_form = PlaceForm::default();
        }
    }

    fn render_map(&mut self, ctx: &egui::Context) {
        self.checkin.sync_markers();
        egui::CentralPanel::default()
            .frame(egui::Frame::new().fill(self.theme.surface_0))
            .show(ctx, |ui| {
                if let Some(interaction) = self.checkin.map_mut().show(ui, self.theme) {
                    self.checkin.handle_map_interaction(interaction);
                }
            });
    }

    fn render_notices(&mut self, ctx: &egui::Context) {
        if !self.view.toasts.is_empty() {
            egui::TopBottomPanel::bottom("toasts").show(ctx, |ui| {
                for (text, _) in &self.view.toasts {
                    ui.label(RichText::new(text).color(self.theme.warning));
                }
            });
        }

        let Some(text) = self.view.active_alert.clone() else {
            return;
        };
        let modal = egui::Modal::new(egui::Id::new("alert")).show(ctx, |ui| {
            ui.set_max_width(320.0);
            ui.label(text);
            ui.add_space(self.theme.spacing_8);
            ui.button("OK").clicked()
        });
        if modal.inner || modal.should_close() {
            self.view.active_alert = None;
        }
    }
}

impl eframe::App for DakaApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if !self.visuals_applied {
            self.theme.apply_visuals(ctx);
            self.visuals_applied = true;
        }
        self.drain_events(ctx);
        self.collect_notices(ctx);

        if self.checkin.is_none() {
            self.render_region_select(ctx);
            return;
        }
        let Some(checkin) = self.checkin.as_mut() else {
            return;
        };
        let mut screen = CheckinView {
            checkin,
            view: &mut self.view,
            theme: &self.theme,
        };

        screen.render_notices(ctx);
        if screen.view.show_landing {
            screen.render_landing(ctx);
        } else {
            let mut switch_to = None;
            screen.render_top_bar(ctx, &mut switch_to);
            screen.render_chat_panel(ctx);
            screen.render_place_panel(ctx);
            screen.render_place_form(ctx);
            screen.render_map(ctx);
            if let Some(region) = switch_to {
                screen.checkin.switch_region(region);
                screen.view.show_landing =
                    region.supports_sign_in() && !screen.checkin.session().is_signed_in();
            }
        }

        ctx.request_repaint_after(EVENT_POLL_INTERVAL);
    }
}
