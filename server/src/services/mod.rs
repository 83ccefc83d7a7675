pub mod fetcher;
pub mod report;
pub mod scoring;
