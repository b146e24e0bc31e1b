/// Creates a single transient [`Message`](crate::Message) from a role shorthand.
///
/// ```rust
/// use parley::{Role, parley_msg};
///
/// let message = parley_msg!(assistant => r#"{"ok":true}"#);
/// assert_eq!(message.role, Role::Assistant);
/// assert_eq!(message.content, r#"{"ok":true}"#);
/// ```
#[macro_export]
macro_rules! parley_msg {
    (user => $content:expr $(,)?) => {
        $crate::Message::new($crate::Role::User, $content)
    };
    (assistant => $content:expr $(,)?) => {
        $crate::Message::new($crate::Role::Assistant, $content)
    };
    ($role:ident => $content:expr $(,)?) => {
        compile_error!("unsupported role: use user or assistant");
    };
}

/// Creates a `Vec<Message>` from role/content pairs.
///
/// ```rust
/// use parley::{Role, parley_messages};
///
/// let history = parley_messages![
///     user => "Build a feedback form.",
///     assistant => r#"{"nodes":[]}"#,
/// ];
///
/// assert_eq!(history.len(), 2);
/// assert_eq!(history[1].role, Role::Assistant);
/// ```
#[macro_export]
macro_rules! parley_messages {
    () => {
        Vec::<$crate::Message>::new()
    };
    ($($role:ident => $content:expr),+ $(,)?) => {
        vec![$($crate::parley_msg!($role => $content)),+]
    };
}

/// Creates [`Rules`](crate::Rules) with optional schema and token budget.
///
/// ```rust
/// use parley::parley_rules;
///
/// let rules = parley_rules!("Return JSON.", schema = r#"{"type":"object"}"#, max_tokens = 1024);
/// assert_eq!(rules.max_tokens, 1024);
/// assert_eq!(rules.output_schema, r#"{"type":"object"}"#);
/// ```
#[macro_export]
macro_rules! parley_rules {
    ($system_prompt:expr $(,)?) => {
        $crate::Rules::new($system_prompt)
    };
    ($system_prompt:expr, schema = $schema:expr $(,)?) => {
        $crate::Rules::new($system_prompt).with_output_schema($schema)
    };
    ($system_prompt:expr, max_tokens = $max_tokens:expr $(,)?) => {
        $crate::Rules::new($system_prompt).with_max_tokens($max_tokens)
    };
    ($system_prompt:expr, schema = $schema:expr, max_tokens = $max_tokens:expr $(,)?) => {
        $crate::Rules::new($system_prompt)
            .with_output_schema($schema)
            .with_max_tokens($max_tokens)
    };
}
