//! HTML listing source for `flatwatch run` / `flatwatch watch`.

mod html;
mod parse;

pub use html::HtmlFetcher;
