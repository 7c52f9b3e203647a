/// Escapes text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Clickable mention that works without a public username.
pub fn user_mention(telegram_id: i64, name: &str) -> String {
    format!(
        "<a href=\"tg://user?id={}\">{}</a>",
        telegram_id,
        escape_html(name)
    )
}
