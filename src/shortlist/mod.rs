mod keywords;
mod store;

pub(crate) use keywords::{shortlist, KeywordSet};
pub(crate) use store::ShortlistStore;
