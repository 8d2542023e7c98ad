use axum::{http::StatusCode, response::{Html, IntoResponse, Response}};

use crate::AppResult;

#[macro_export]
macro_rules! include_res {
    (bytes, $p:expr) => {
        include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/res", $p))
    };
    (str, $p:expr) => {
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/res", $p))
    };
}

/// Wraps a rendered body in the site layout.
pub fn page(title: &str, body: &str) -> String {
    include_res!(str, "/pages/layout.html")
        .replace("{title}", &escape(title))
        .replace("{body}", body)
}

pub fn notice(title: &str, message: &str) -> String {
    page(
        title,
        &include_res!(str, "/pages/notice.html")
            .replace("{title}", &escape(title))
            .replace("{message}", &escape(message)),
    )
}

/// Uniform "not found" for things the viewer may not know exist.
pub fn sorry(what: &str) -> AppResult<Response> {
    Ok((
        StatusCode::NOT_FOUND,
        Html(notice("Not found", &format!("That {what} doesn't exist or isn't visible to you."))),
    )
        .into_response())
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn checked(flag: bool) -> &'static str {
    if flag { "checked" } else { "" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_neutralizes_markup() {
        assert_eq!(
            escape(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn notice_escapes_message() {
        let html = notice("Oops", "<b>bold</b>");
        assert!(html.contains("&lt;b&gt;bold&lt;/b&gt;"));
        assert!(html.contains("<title>Oops"));
    }
}
