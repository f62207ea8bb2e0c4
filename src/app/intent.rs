use crate::ocr::RoiAxis;
use crate::serial::DeviceCommand;

/// Requests from the operator to the processing loop.
///
/// The GUI never touches core state; it sends one of these and the loop
/// applies it at the start of its next tick.
#[derive(Clone, Debug, PartialEq)]
pub enum Intent {
    AdjustRoi { axis: RoiAxis, delta: i32 },
    /// Fixed binarization threshold (used while auto is off)
    SetThreshold(u8),
    /// Switch between Otsu and the fixed threshold
    SetAutoThreshold(bool),
    SendCommand(DeviceCommand),
    /// Drop buffered OCR evidence
    ResetConsensus,
    /// Write the history chart to a PNG in the data directory
    ExportChart,
    Shutdown,
}
