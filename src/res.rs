use axum::response::{Html, IntoResponse, Response};

use crate::db;

#[macro_export]
macro_rules! include_res {
    (bytes, $p:expr) => {
        include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/res", $p))
    };
    (str, $p:expr) => {
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/res", $p))
    };
}

pub fn sorry(what: &str) -> Response {
    Html(format!(
        "<!DOCTYPE html><html><body><p>that {what} doesn't seem to exist</p><a href='/'>go home</a></body></html>"
    ))
    .into_response()
}

pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
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

pub fn markdown(src: &str) -> String {
    let mut html = String::new();
    pulldown_cmark::html::push_html(&mut html, pulldown_cmark::Parser::new(src));
    html
}

pub fn format_price(price: i64) -> String {
    let digits = price.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 2);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out.push_str(" kr");
    out
}

pub fn relative_age(ts: &str) -> String {
    let Some(at) = db::parse_timestamp(ts) else {
        return ts.to_owned();
    };
    let diff = time::OffsetDateTime::now_utc() - at;
    if diff.whole_minutes() < 1 {
        "just now".to_owned()
    } else if diff.whole_minutes() < 60 {
        format!("{}m ago", diff.whole_minutes())
    } else if diff.whole_hours() < 24 {
        format!("{}h ago", diff.whole_hours())
    } else if diff.whole_days() < 7 {
        format!("{}d ago", diff.whole_days())
    } else {
        db::day_of(ts).to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape("<b>&\"'"), "&lt;b&gt;&amp;&quot;&#39;");
    }

    #[test]
    fn formats_prices_with_separators() {
        assert_eq!(format_price(0), "0 kr");
        assert_eq!(format_price(950), "950 kr");
        assert_eq!(format_price(1250000), "1,250,000 kr");
    }
}
