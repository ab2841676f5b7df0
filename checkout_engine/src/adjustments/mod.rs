mod labels;
mod packaging_processor;

pub use labels::DefaultLabeler;
pub use packaging_processor::{verify_totals, AdjustmentError, PackagingAdjustmentProcessor};
