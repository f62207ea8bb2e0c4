//! GUI module for the application.
//!
//! Shows the camera with the ROI, the OCR previews, the sensor dashboard and
//! the CO2 history, and turns buttons and shortcuts into `Intent`s for the
//! processing thread. It never mutates processing state itself.

pub mod render;
pub mod state;

use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use eframe::egui::{self, ColorImage, TextureHandle, TextureOptions, Vec2};

use crate::app::{Dashboard, Intent};
use crate::config::GuiConfig;
use crate::ocr::ThresholdPolicy;

use state::{key_action, GuiState, KeyAction, SHORTCUT_KEYS};

/// Repaint period while the live view is up.
const REPAINT_INTERVAL: Duration = Duration::from_millis(33);

/// Textures for the latest frame, refreshed when `seq` falls behind.
#[derive(Default)]
pub struct FrameTextures {
    pub frame: Option<TextureHandle>,
    pub gray: Option<TextureHandle>,
    pub binary: Option<TextureHandle>,
    seq: u64,
}

fn upload(
    ctx: &egui::Context,
    slot: &mut Option<TextureHandle>,
    name: &str,
    image: Option<ColorImage>,
) {
    match (image, slot.as_mut()) {
        (Some(image), Some(handle)) => handle.set(image, TextureOptions::LINEAR),
        (Some(image), None) => *slot = Some(ctx.load_texture(name, image, TextureOptions::LINEAR)),
        (None, _) => *slot = None,
    }
}

impl FrameTextures {
    fn refresh(&mut self, ctx: &egui::Context, dash: &Dashboard) {
        if dash.frame_seq == self.seq {
            return;
        }
        self.seq = dash.frame_seq;

        let frame = dash.frame.as_ref().map(|f| {
            let size = [f.width() as usize, f.height() as usize];
            ColorImage::from_rgb(size, f.as_raw())
        });
        let gray = dash.gray.as_ref().map(|g| {
            ColorImage::from_gray([g.width() as usize, g.height() as usize], g.as_raw())
        });
        let binary = dash.binary.as_ref().map(|b| {
            ColorImage::from_gray([b.width() as usize, b.height() as usize], b.as_raw())
        });

        upload(ctx, &mut self.frame, "camera_frame", frame);
        upload(ctx, &mut self.gray, "roi_gray", gray);
        upload(ctx, &mut self.binary, "roi_binary", binary);
    }
}

/// Main GUI application struct.
pub struct GuiApp {
    state: GuiState,
    textures: FrameTextures,
    intents: Sender<Intent>,
    dashboard: Arc<Mutex<Dashboard>>,
    closing: bool,
}

impl GuiApp {
    pub fn new(state: GuiState, intents: Sender<Intent>, dashboard: Arc<Mutex<Dashboard>>) -> Self {
        Self {
            state,
            textures: FrameTextures::default(),
            intents,
            dashboard,
            closing: false,
        }
    }

    /// Keyboard shortcuts. Returns `true` if the operator asked to quit.
    fn handle_shortcuts(&self, ctx: &egui::Context, pending: &mut Vec<Intent>) -> bool {
        // Typing a setpoint must not move the ROI
        if ctx.wants_keyboard_input() {
            return false;
        }

        let mut quit = false;
        ctx.input(|input| {
            for key in SHORTCUT_KEYS {
                if !input.key_pressed(key) {
                    continue;
                }
                match key_action(key) {
                    Some(KeyAction::Send(intent)) => pending.push(intent),
                    Some(KeyAction::Quit) => quit = true,
                    None => {}
                }
            }
        });
        quit
    }

    fn send(&self, pending: Vec<Intent>) {
        for intent in pending {
            log::debug!("GUI intent: {:?}", intent);
            if self.intents.send(intent).is_err() {
                // Processing thread is gone; the dashboard shows why
                break;
            }
        }
    }
}

impl eframe::App for GuiApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let dash = match self.dashboard.lock() {
            Ok(dash) => dash.clone(),
            Err(_) => {
                log::error!("Dashboard lock poisoned, closing window");
                ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                return;
            }
        };

        // The processing loop is dead; main reports the fault on exit
        if let Some(fault) = &dash.fault {
            if !self.closing {
                log::error!("Closing window after processing fault: {}", fault);
                self.closing = true;
                ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            }
        }

        self.textures.refresh(ctx, &dash);

        let mut pending = Vec::new();
        if self.handle_shortcuts(ctx, &mut pending) {
            log::info!("Quit requested from keyboard");
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }

        egui::TopBottomPanel::top("status_bar").show(ctx, |ui| {
            render::render_status_bar(ui, &dash);
        });

        egui::SidePanel::right("controls")
            .resizable(false)
            .min_width(300.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    render::render_sensor_panel(ui, &dash);
                    ui.separator();
                    render::render_ocr_controls(ui, &mut self.state, &dash, &mut pending);
                    ui.separator();
                    render::render_command_bar(ui, &mut self.state, &mut pending);
                });
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                render::render_camera(ui, &dash, &self.textures, self.state.preview_width);
                ui.add_space(8.0);
                render::render_previews(ui, &dash, &self.textures);
                ui.separator();
                render::render_history(ui, &dash, &mut pending);
            });
        });

        self.send(pending);
        ctx.request_repaint_after(REPAINT_INTERVAL);
    }
}

/// Run the GUI application.
/// This function blocks until the window is closed.
pub fn run_gui(
    config: &GuiConfig,
    threshold: ThresholdPolicy,
    intents: Sender<Intent>,
    dashboard: Arc<Mutex<Dashboard>>,
) -> eframe::Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size(Vec2::new(config.preview_width + 360.0, 820.0))
            .with_min_inner_size(Vec2::new(800.0, 600.0))
            .with_title(&config.window_title),
        ..Default::default()
    };

    let state = GuiState::new(threshold, config.preview_width);
    log::info!("Opening window '{}'", config.window_title);

    eframe::run_native(
        &config.window_title,
        options,
        Box::new(move |_cc| Ok(Box::new(GuiApp::new(state, intents, dashboard)))),
    )
}
