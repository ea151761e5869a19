/// Render a message template, binding `{key}` placeholders from `key = value`
/// pairs.
///
/// ```
/// use devspace_messages::{msg, MESSAGES};
///
/// let text = msg!(MESSAGES.workspace.agent_error, error = "OOM");
/// assert!(text.ends_with("OOM"));
/// ```
#[macro_export]
macro_rules! msg {
    ($template:expr $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::builder::MessageBuilder::new($template)
            $(.var(stringify!($key), $value))*
            .build()
    };
}
