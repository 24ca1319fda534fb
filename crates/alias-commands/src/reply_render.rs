//! Quoted-reply and help rendering for `!alias` responses.

use alias_provisioner::{ReplyStatus, RoomMessage};

const MATRIX_TO_BASE: &str = "https://matrix.to/#/";

/// Removes markup tags, keeping their text content.
pub fn strip_html_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }
    text
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Builds a notice that quotes the source message and threads as a reply to it.
pub fn render_quoted_reply(
    room_id: &str,
    event_id: &str,
    sender: &str,
    original_body: &str,
    html_message: &str,
    status: ReplyStatus,
) -> RoomMessage {
    let body = format!(
        "> <{sender}> {original_body}\n\n{}",
        strip_html_tags(html_message)
    );
    let sender = escape_html(sender);
    let quoted = escape_html(original_body);
    let formatted_body = format!(
        "<mx-reply><blockquote><a href='{MATRIX_TO_BASE}{room_id}/{event_id}'>In reply to</a> \
         <a href='{MATRIX_TO_BASE}{sender}'>{sender}</a><br/>{quoted}</blockquote></mx-reply>{html_message}"
    );
    RoomMessage {
        body,
        formatted_body: Some(formatted_body),
        status: Some(status),
        in_reply_to: Some(event_id.to_string()),
    }
}

pub fn render_allowed_aliases_html(patterns: &[String]) -> String {
    format!(
        "<p>You are able to use the following alias formats<br /><ul><li><code>{}</code></li></ul></p>",
        patterns.join("</code></li><li><code>")
    )
}

pub fn render_help_html(alias_domain: &str, help_room: Option<&str>) -> String {
    let mut html = format!(
        "<p>Alias bot help:<br /><pre><code>\
         !alias #mycoolalias          - Adds an alias on {alias_domain}\n\
         !alias remove &lt;alias&gt;        - Removes the given alias from the room\n\
         !alias allowed               - Lists the allowed alias formats\n\
         !alias publish               - Publishes this room on the public room directory for {alias_domain}\n\
         !alias unpublish             - Removes this room from the public room directory for {alias_domain}\n\
         !alias help                  - This menu\n\
         </code></pre></p>"
    );
    if let Some(room) = help_room.map(str::trim).filter(|room| !room.is_empty()) {
        html.push_str(&format!(
            "<p>For help or more information, visit <a href='{MATRIX_TO_BASE}{room}'>{room}</a></p>"
        ));
    }
    html
}
