pub mod blink;
pub mod peaks;
pub mod prominence;

pub use blink::{
    detect_blinks, detect_blinks_with, windows, BlinkDetection, DetectionConfig,
    RefractoryCursor, Windows,
};
pub use peaks::find_peaks;
pub use prominence::{detect_blinks_by_prominence, ProminenceConfig, ProminenceDetection};
