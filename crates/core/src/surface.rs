use crate::target::PlSchema;

pub trait EditingSurface: Send + Sync {
    fn is_saved(&self) -> bool;

    fn content(&self) -> String;

    fn set_content(&self, content: &str);

    fn formatted_target(&self) -> PlSchema;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnonymousBlockCheck {
    pub is_anonymous_block: bool,
}

pub trait PlParser: Send + Sync {
    fn parse_as_anonymous_block(&self, source: &str) -> AnonymousBlockCheck;
}
