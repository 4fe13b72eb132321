use super::render::{ChartFragment, Table};

/// Shown when an answer had nothing to render
pub const NO_DATA_MESSAGE: &str = "No Data Available";

/// Shown for any failed turn
pub const FAILURE_MESSAGE: &str = "Sorry, I'm having trouble understanding your question.";

/// Placeholder text while a turn is in flight
pub const PENDING_MESSAGE: &str = "Thinking...";

/// Where finished turns end up. The chat session only ever writes to
/// a surface, it never reads from it.
pub trait Surface: Send {
    fn text(&mut self, text: &str);
    fn table(&mut self, table: &Table);
    fn chart(&mut self, chart: &ChartFragment);
    fn empty(&mut self, message: &str);
    fn failure(&mut self, message: &str);

    /// Called when a turn starts and when it finishes, however it
    /// finishes. Surfaces use it to disable their send control.
    fn busy(&mut self, _busy: bool) {}
}
