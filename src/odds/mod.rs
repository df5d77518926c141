pub mod capture;
pub mod extractor;

pub use capture::capture_totals;
pub use extractor::extract_totals;
