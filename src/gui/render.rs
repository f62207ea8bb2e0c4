//! GUI rendering functions.
//!
//! Contains UI layout and component rendering logic. Functions read the
//! published `Dashboard` and push the operator's actions into `intents`.

use eframe::egui::{self, Color32, RichText, Stroke, TextureHandle, Vec2};
use egui_plot::{Legend, Line, Plot, PlotPoints};

use super::state::GuiState;
use super::FrameTextures;
use crate::app::{Dashboard, Intent};
use crate::ocr::roi::ROI_STEP;
use crate::ocr::RoiAxis;
use crate::serial::{DeviceCommand, LinkState};

const OK_COLOR: Color32 = Color32::from_rgb(0, 150, 0);
const WARN_COLOR: Color32 = Color32::from_rgb(200, 150, 0);
const ERROR_COLOR: Color32 = Color32::from_rgb(200, 0, 0);

/// Link state, loop fault and the last operator feedback.
pub fn render_status_bar(ui: &mut egui::Ui, dash: &Dashboard) {
    ui.horizontal(|ui| {
        let (text, color) = match dash.link {
            LinkState::Connected => ("Conectado", OK_COLOR),
            LinkState::Disconnected => ("Desconectado", ERROR_COLOR),
        };
        ui.label("ESP32:");
        ui.label(RichText::new(text).color(color).strong());
        ui.label(format!("({}, intentos: {})", dash.link_target, dash.link_attempts));

        if let Some(message) = &dash.status_message {
            ui.separator();
            ui.label(message);
        }
    });

    if let Some(fault) = &dash.fault {
        ui.label(
            RichText::new(format!("Procesamiento detenido: {}", fault))
                .color(ERROR_COLOR)
                .strong(),
        );
    } else if !dash.running {
        ui.label(RichText::new("Procesamiento detenido").color(WARN_COLOR));
    }
}

/// Camera frame scaled to `width`, with the ROI drawn on top.
pub fn render_camera(ui: &mut egui::Ui, dash: &Dashboard, textures: &FrameTextures, width: f32) {
    let (Some(texture), Some(frame)) = (&textures.frame, &dash.frame) else {
        let size = Vec2::new(width, width * 0.75);
        let (rect, _) = ui.allocate_exact_size(size, egui::Sense::hover());
        ui.painter().rect_filled(rect, 4.0, Color32::from_gray(40));
        ui.painter().text(
            rect.center(),
            egui::Align2::CENTER_CENTER,
            "Sin imagen de cámara",
            egui::FontId::proportional(16.0),
            Color32::from_gray(160),
        );
        return;
    };

    let (frame_w, frame_h) = frame.dimensions();
    let scale = width / frame_w.max(1) as f32;
    let size = Vec2::new(width, frame_h as f32 * scale);
    let response = ui.image((texture.id(), size));

    let origin = response.rect.min;
    let roi = dash.roi;
    let roi_rect = egui::Rect::from_min_size(
        origin + Vec2::new(roi.x as f32 * scale, roi.y as f32 * scale),
        Vec2::new(roi.width as f32 * scale, roi.height as f32 * scale),
    );
    let painter = ui.painter_at(response.rect);
    painter.rect_stroke(roi_rect, 0.0, Stroke::new(2.0, Color32::GREEN));
    painter.text(
        roi_rect.left_top() - Vec2::new(0.0, 2.0),
        egui::Align2::LEFT_BOTTOM,
        format!("OCR: {}", dash.ocr_co2_text()),
        egui::FontId::proportional(14.0),
        Color32::GREEN,
    );
}

fn render_preview(ui: &mut egui::Ui, label: &str, texture: Option<&TextureHandle>) {
    ui.vertical(|ui| {
        ui.label(label);
        match texture {
            Some(texture) => {
                let [w, h] = texture.size();
                let scale = 160.0 / w.max(1) as f32;
                ui.image((texture.id(), Vec2::new(160.0, h as f32 * scale)));
            }
            None => {
                ui.label(RichText::new("---").color(Color32::GRAY));
            }
        }
    });
}

/// Greyscale and binarized ROI crops, as fed to the OCR engine.
pub fn render_previews(ui: &mut egui::Ui, dash: &Dashboard, textures: &FrameTextures) {
    ui.horizontal(|ui| {
        render_preview(ui, "Gris", textures.gray.as_ref());
        ui.add_space(12.0);
        render_preview(ui, "Binaria", textures.binary.as_ref());
        ui.add_space(12.0);
        ui.vertical(|ui| {
            ui.label(format!("Texto OCR: '{}'", dash.last_raw_text));
            let threshold = dash
                .threshold_in_use
                .map(|t| t.to_string())
                .unwrap_or_else(|| "---".to_string());
            ui.label(format!("Umbral aplicado: {}", threshold));
        });
    });
}

/// Sensor values, both CO2 readings and the controller state.
pub fn render_sensor_panel(ui: &mut egui::Ui, dash: &Dashboard) {
    ui.heading("Mediciones");
    ui.add_space(4.0);

    egui::Grid::new("sensor_grid")
        .num_columns(2)
        .striped(true)
        .show(ui, |ui| {
            let rows = [
                ("Temperatura", format!("{} °C", dash.temperature_text())),
                ("Humedad", format!("{} %", dash.humidity_text())),
                ("Presión", format!("{} hPa", dash.pressure_text())),
                ("CO2 sensor", format!("{} ppm", dash.sensor_co2_text())),
                ("CO2 Vaisala (OCR)", format!("{} ppm", dash.ocr_co2_text())),
                ("Estado PCB1", dash.pcb1_state_text()),
                ("Estado PCB2", dash.device_state_text()),
                ("Enfriador", dash.cooler_text()),
            ];
            for (name, value) in rows {
                ui.label(name);
                ui.label(RichText::new(value).monospace().strong());
                ui.end_row();
            }
        });

    ui.add_space(4.0);
    ui.label(format!(
        "Confianza OCR: {}  (buffer {}/{})",
        dash.confidence_text(),
        dash.buffer_len,
        dash.buffer_capacity
    ));
}

/// Threshold slider, Otsu toggle, ROI nudges and buffer reset.
pub fn render_ocr_controls(
    ui: &mut egui::Ui,
    state: &mut GuiState,
    dash: &Dashboard,
    intents: &mut Vec<Intent>,
) {
    ui.heading("OCR");
    ui.add_space(4.0);

    if ui.checkbox(&mut state.auto_threshold, "Umbral automático (Otsu)").changed() {
        intents.push(Intent::SetAutoThreshold(state.auto_threshold));
    }

    ui.add_enabled_ui(!state.auto_threshold, |ui| {
        if ui
            .add(egui::Slider::new(&mut state.threshold, 0..=255).text("Umbral"))
            .changed()
        {
            intents.push(Intent::SetThreshold(state.threshold));
        }
    });

    ui.add_space(4.0);
    ui.label(format!(
        "ROI: x={} y={} {}x{}",
        dash.roi.x, dash.roi.y, dash.roi.width, dash.roi.height
    ));

    let buttons = [
        ("↑", RoiAxis::Y, -ROI_STEP),
        ("←", RoiAxis::X, -ROI_STEP),
        ("→", RoiAxis::X, ROI_STEP),
        ("↓", RoiAxis::Y, ROI_STEP),
        ("W+", RoiAxis::Width, ROI_STEP),
        ("W-", RoiAxis::Width, -ROI_STEP),
        ("H+", RoiAxis::Height, ROI_STEP),
        ("H-", RoiAxis::Height, -ROI_STEP),
    ];
    ui.horizontal_wrapped(|ui| {
        for (label, axis, delta) in buttons {
            if ui.button(label).clicked() {
                intents.push(Intent::AdjustRoi { axis, delta });
            }
        }
    });

    if ui.button("Reiniciar buffer").clicked() {
        intents.push(Intent::ResetConsensus);
    }
}

/// Setpoint and pulse entries plus the one-shot command buttons.
pub fn render_command_bar(ui: &mut egui::Ui, state: &mut GuiState, intents: &mut Vec<Intent>) {
    ui.heading("Comandos");
    ui.add_space(4.0);

    ui.horizontal(|ui| {
        ui.label("CO2 (ppm):");
        ui.add(egui::TextEdit::singleline(&mut state.setpoint_input).desired_width(60.0));
        if ui.button("SET_CO2").clicked() {
            if let Some(command) = state.setpoint_command() {
                intents.push(Intent::SendCommand(command));
            }
        }
    });

    ui.horizontal(|ui| {
        ui.label("Pulso (ms):");
        ui.add(egui::TextEdit::singleline(&mut state.pulse_input).desired_width(60.0));
        if ui.button("PULSE").clicked() {
            if let Some(command) = state.pulse_command() {
                intents.push(Intent::SendCommand(command));
            }
        }
    });

    if let Some(error) = &state.input_error {
        ui.label(RichText::new(error).color(ERROR_COLOR));
    }

    ui.horizontal_wrapped(|ui| {
        if ui.button("TOGGLE_COOLER").clicked() {
            intents.push(Intent::SendCommand(DeviceCommand::ToggleCooler));
        }
        if ui.button("CALIBRATE_SENSOR").clicked() {
            intents.push(Intent::SendCommand(DeviceCommand::CalibrateSensor));
        }
        let panic = egui::Button::new(RichText::new("OPEN_ALL").color(Color32::WHITE))
            .fill(ERROR_COLOR);
        if ui.add(panic).clicked() {
            intents.push(Intent::SendCommand(DeviceCommand::OpenAll));
        }
    });

    ui.add_space(4.0);
    ui.label(
        RichText::new(
            "Teclas: W/A/S/D mover ROI, Z SET_CO2(800), K calibrar, P OPEN_ALL, \
             T enfriador, Q salir",
        )
        .small()
        .color(Color32::GRAY),
    );
}

/// Live sensor vs OCR plot and the chart export button.
pub fn render_history(ui: &mut egui::Ui, dash: &Dashboard, intents: &mut Vec<Intent>) {
    ui.horizontal(|ui| {
        ui.heading("Historial CO2");
        if ui.button("📊 Exportar gráfica").clicked() {
            intents.push(Intent::ExportChart);
        }
    });

    let sensor: Vec<[f64; 2]> = dash
        .history
        .iter()
        .filter_map(|s| s.sensor_co2.map(|v| [s.t_secs, v]))
        .collect();
    let ocr: Vec<[f64; 2]> = dash
        .history
        .iter()
        .filter_map(|s| s.ocr_co2.map(|v| [s.t_secs, v]))
        .collect();

    Plot::new("co2_history")
        .legend(Legend::default())
        .height(220.0)
        .x_axis_label("s")
        .y_axis_label("ppm")
        .show(ui, |plot_ui| {
            plot_ui.line(Line::new(PlotPoints::new(sensor)).name("Sensor"));
            plot_ui.line(Line::new(PlotPoints::new(ocr)).name("Vaisala (OCR)"));
        });
}
