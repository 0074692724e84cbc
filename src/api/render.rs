//! HTML pages

use crate::auth::{Flash, FlashLevel};
use crate::storage::{Asset, Listing};

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; margin: 0; background: #faf7fb; color: #2d2433; }
header { display: flex; justify-content: space-between; align-items: center; padding: 1rem 2rem; background: #fff; box-shadow: 0 1px 4px rgba(0,0,0,.08); }
main { max-width: 1100px; margin: 2rem auto; padding: 0 1rem; }
.flash { padding: .75rem 1rem; border-radius: 6px; margin-bottom: .5rem; }
.flash.success { background: #e6f6ea; }
.flash.error { background: #fde8ea; }
.grid { display: grid; grid-template-columns: repeat(auto-fill, minmax(220px, 1fr)); gap: 1rem; margin-top: 1.5rem; }
.media-item { background: #fff; border-radius: 8px; padding: .5rem; box-shadow: 0 1px 4px rgba(0,0,0,.08); }
.media-item img, .media-item video { width: 100%; border-radius: 6px; }
.media-item form { margin: .25rem 0 0; }
.empty { color: #857a8c; }
"#;

/// Escape text for HTML element and attribute content
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn page(title: &str, header_right: &str, flashes: &[Flash], body: &str) -> String {
    let mut html = String::from("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str(&format!("<title>{}</title>\n", escape(title)));
    html.push_str(&format!("<style>{}</style>\n", STYLE));
    html.push_str("</head>\n<body>\n");
    html.push_str(&format!("<header><h1>{}</h1>{}</header>\n<main>\n", escape(title), header_right));

    for flash in flashes {
        let class = match flash.level {
            FlashLevel::Success => "success",
            FlashLevel::Error => "error",
        };
        html.push_str(&format!(
            "<div class=\"flash {}\">{}</div>\n",
            class,
            escape(&flash.message)
        ));
    }

    html.push_str(body);
    html.push_str("</main>\n</body>\n</html>\n");
    html
}

pub fn login_page(flashes: &[Flash]) -> String {
    let form = r#"<form method="post" action="/login">
  <p><label>Username <input name="username" autocomplete="username" required></label></p>
  <p><label>Password <input name="password" type="password" autocomplete="current-password" required></label></p>
  <p><button type="submit">Log in</button></p>
</form>
"#;
    page("Media Vault", "", flashes, form)
}

fn media_item(asset: &Asset) -> String {
    let url = escape(&asset.url);
    let media = if asset.is_video() {
        format!(
            "<video controls preload=\"metadata\"><source src=\"{}\" type=\"{}\"></video>",
            url,
            escape(&asset.content_type)
        )
    } else {
        format!("<img src=\"{}\" alt=\"{}\" loading=\"lazy\">", url, escape(&asset.name))
    };

    format!(
        "<div class=\"media-item\">{}\n<div>{}</div>\n<div><small>{}</small></div>\n\
         <form method=\"post\" action=\"/delete/{}\"><button type=\"submit\">Delete</button></form>\n</div>\n",
        media,
        escape(&asset.name),
        asset.created_at.format("%Y-%m-%d %H:%M UTC"),
        escape(&percent_encode_segment(&asset.key))
    )
}

pub fn gallery_page(listing: &Listing, flashes: &[Flash]) -> String {
    let mut flashes = flashes.to_vec();
    if let Some(error) = &listing.error {
        flashes.push(Flash::error(error.clone()));
    }

    let mut body = String::from(
        r#"<form method="post" action="/upload" enctype="multipart/form-data">
  <input type="file" name="file" accept="image/*,video/*" multiple required>
  <button type="submit">Upload</button>
</form>
"#,
    );

    if listing.assets.is_empty() {
        body.push_str("<p class=\"empty\">No media yet. Upload something!</p>\n");
    } else {
        body.push_str("<div class=\"grid\">\n");
        for asset in &listing.assets {
            body.push_str(&media_item(asset));
        }
        body.push_str("</div>\n");
    }

    page("Media Vault", "<a href=\"/logout\">Log out</a>", &flashes, &body)
}

/// Encode a key for use as one URL path segment
fn percent_encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for b in segment.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}
