//! PNG export of the CO2 history using plotters.
//!
//! Plots the controller's sensor against the OCR reading of the reference
//! instrument, with the mean offset between the two in the caption.

use crate::app::HistorySample;
use anyhow::{bail, Context, Result};
use chrono::Local;
use plotters::prelude::*;
use std::path::{Path, PathBuf};

const CHART_WIDTH: u32 = 1200;
const CHART_HEIGHT: u32 = 600;

/// Headroom above and below the plotted values, in ppm.
const PPM_MARGIN: f64 = 50.0;

/// Time span of the samples; never empty.
fn time_range(samples: &[HistorySample]) -> (f64, f64) {
    let min = samples.iter().map(|s| s.t_secs).fold(f64::INFINITY, f64::min);
    let max = samples.iter().map(|s| s.t_secs).fold(f64::NEG_INFINITY, f64::max);
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    if max - min < 1.0 {
        (min, min + 1.0)
    } else {
        (min, max)
    }
}

/// ppm span over both series, padded by `PPM_MARGIN`.
fn ppm_range(samples: &[HistorySample]) -> (f64, f64) {
    let values = samples
        .iter()
        .flat_map(|s| [s.sensor_co2, s.ocr_co2])
        .flatten();

    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 2000.0);
    }
    ((min - PPM_MARGIN).max(0.0), max + PPM_MARGIN)
}

/// Mean of `sensor - ocr` over samples that carry both values.
fn mean_offset(samples: &[HistorySample]) -> Option<f64> {
    let diffs: Vec<f64> = samples
        .iter()
        .filter_map(|s| Some(s.sensor_co2? - s.ocr_co2?))
        .collect();
    if diffs.is_empty() {
        return None;
    }
    Some(diffs.iter().sum::<f64>() / diffs.len() as f64)
}

/// File name for a chart exported now: `co2_history_YYYYMMDD_HHMMSS.png`.
pub fn timestamped_path(dir: &Path) -> PathBuf {
    dir.join(format!(
        "co2_history_{}.png",
        Local::now().format("%Y%m%d_%H%M%S")
    ))
}

/// Renders the history to a PNG at `output_path`.
pub fn export_history(samples: &[HistorySample], output_path: &Path) -> Result<()> {
    if samples.is_empty() {
        bail!("No history to plot yet");
    }

    let root = BitMapBackend::new(output_path, (CHART_WIDTH, CHART_HEIGHT)).into_drawing_area();
    root.fill(&WHITE).context("Failed to fill chart background")?;

    let caption = match mean_offset(samples) {
        Some(offset) => format!("CO2 history (sensor - OCR: {:+.0} ppm)", offset),
        None => "CO2 history".to_string(),
    };

    let (t_min, t_max) = time_range(samples);
    let (y_min, y_max) = ppm_range(samples);

    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 24))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(t_min..t_max, y_min..y_max)?;

    chart
        .configure_mesh()
        .x_desc("Time (s)")
        .y_desc("CO2 (ppm)")
        .draw()?;

    chart
        .draw_series(LineSeries::new(
            samples
                .iter()
                .filter_map(|s| s.sensor_co2.map(|v| (s.t_secs, v))),
            &BLUE,
        ))?
        .label("Sensor")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));

    chart
        .draw_series(LineSeries::new(
            samples.iter().filter_map(|s| s.ocr_co2.map(|v| (s.t_secs, v))),
            &RED,
        ))?
        .label("OCR (reference)")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present().context("Failed to save chart")?;
    Ok(())
}
