/// Settings key holding the rolling summary text.
pub const SETTING_SUMMARY: &str = "summary";

/// Settings key holding the LLM bearer token set through the `apikey` command.
pub const SETTING_API_KEY: &str = "apikey";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SummaryStatus {
    #[default]
    NotGenerated,
    Generating,
    Generated,
    Failed,
}
