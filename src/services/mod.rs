pub(crate) mod question_seeds;
pub(crate) mod reports;
pub(crate) mod scoring;
