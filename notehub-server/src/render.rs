//! Server-rendered HTML pages

use notehub_common::markdown::{
    escape_html, extract_meta, generate_description, generate_web_title, parse_meta,
    render_html, NoteMeta,
};
use notehub_common::models::{Note, User};
use notehub_common::note_id::encode_note_id;

const STYLE: &str = r#"
        body {
            font-family: system-ui, -apple-system, sans-serif;
            max-width: 860px;
            margin: 40px auto;
            padding: 0 20px;
            line-height: 1.6;
            color: #333;
        }
        header { border-bottom: 2px solid #0066cc; margin-bottom: 20px; }
        a.button {
            display: inline-block;
            padding: 6px 14px;
            background: #0066cc;
            color: white;
            text-decoration: none;
            border-radius: 4px;
        }
        textarea { width: 100%; min-height: 70vh; font-family: monospace; }
        .meta { color: #777; font-size: 0.9em; }
"#;

struct Head<'a> {
    title: String,
    description: Option<String>,
    robots: Option<&'a str>,
}

fn layout(head: Head<'_>, body: &str) -> String {
    let description = head
        .description
        .map(|d| format!(r#"<meta name="description" content="{}">"#, escape_html(&d)))
        .unwrap_or_default();
    let robots = head
        .robots
        .map(|r| format!(r#"<meta name="robots" content="{}">"#, escape_html(r)))
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    {description}
    {robots}
    <style>{style}</style>
</head>
<body>
{body}
</body>
</html>
"#,
        title = escape_html(&head.title),
        description = description,
        robots = robots,
        style = STYLE,
        body = body,
    )
}

/// Meta and body of a note, with the description filled in
fn note_parts(note: &Note) -> (NoteMeta, &str, String) {
    let (meta, body) = extract_meta(&note.content);
    let meta = parse_meta(meta);
    let description = meta
        .description
        .clone()
        .unwrap_or_else(|| generate_description(body));
    (meta, body, description)
}

pub fn error_page(status: u16, message: &str) -> String {
    layout(
        Head {
            title: format!("{} {}", status, message),
            description: None,
            robots: Some("noindex, nofollow"),
        },
        &format!(
            "<header><h1>{}</h1></header>\n<p>{}</p>\n<p><a href=\"/\">Back to notehub</a></p>",
            status,
            escape_html(message)
        ),
    )
}

/// Landing page; signed-in users see their latest notes
pub fn index_page(user: Option<&User>, notes: &[Note]) -> String {
    let body = match user {
        None => r#"<header><h1>notehub</h1></header>
<p>Collaborative markdown notes.</p>
<p><a href="/new" class="button">New note</a></p>"#
            .to_string(),
        Some(user) => {
            let items: String = notes
                .iter()
                .map(|note| {
                    format!(
                        "<li><a href=\"/{}\">{}</a> <span class=\"meta\">{} views</span></li>\n",
                        encode_note_id(&note.id),
                        escape_html(&note.title),
                        note.viewcount
                    )
                })
                .collect();
            format!(
                "<header><h1>notehub</h1></header>\n<p>Signed in as {}</p>\n\
                 <p><a href=\"/new\" class=\"button\">New note</a></p>\n<ul>\n{}</ul>",
                escape_html(user.name()),
                items
            )
        }
    };

    layout(
        Head {
            title: "notehub".to_string(),
            description: None,
            robots: None,
        },
        &body,
    )
}

/// Collaborative editor for a note
pub fn editor_page(note: &Note, editable: bool) -> String {
    let id = encode_note_id(&note.id);
    let readonly = if editable { "" } else { " readonly" };
    let body = format!(
        r#"<header><h1>{title}</h1></header>
<p class="meta">
    <a href="/{id}/publish">Publish</a> |
    <a href="/{id}/slide">Slide</a> |
    <a href="/{id}/download">Download</a>
</p>
<textarea id="editor" data-note="{id}"{readonly}>{content}</textarea>
<script>
    const socket = new WebSocket(
        (location.protocol === "https:" ? "wss://" : "ws://") + location.host + "/realtime/{id}");
    socket.addEventListener("message", (event) => {{
        const msg = JSON.parse(event.data);
        if (msg.type === "doc") {{
            document.getElementById("editor").value = msg.content;
        }}
    }});
</script>"#,
        title = escape_html(&note.title),
        id = id,
        readonly = readonly,
        content = escape_html(&note.content),
    );

    layout(
        Head {
            title: generate_web_title(&note.title),
            description: None,
            robots: Some("noindex, nofollow"),
        },
        &body,
    )
}

/// Published, read-only rendering of a note
pub fn publish_page(note: &Note) -> String {
    let (meta, body, description) = note_parts(note);
    let updated = note.last_change_at.unwrap_or(note.updated_at);
    let page = format!(
        "<article>\n{}\n</article>\n<p class=\"meta\">{} views | last changed {}</p>",
        render_html(body),
        note.viewcount,
        updated.to_rfc3339()
    );

    layout(
        Head {
            title: generate_web_title(&note.title),
            description: Some(description),
            robots: meta.robots.as_deref(),
        },
        &page,
    )
}

/// Slide view: one section per `---` separated slide
pub fn slide_page(note: &Note) -> String {
    let (meta, body, description) = note_parts(note);
    let slides: String = body
        .split("\n---\n")
        .map(|slide| format!("<section class=\"slide\">\n{}\n</section>\n", render_html(slide)))
        .collect();

    layout(
        Head {
            title: generate_web_title(&note.title),
            description: Some(description),
            robots: meta.robots.as_deref(),
        },
        &slides,
    )
}

/// Standalone HTML document of a note
pub fn export_document(note: &Note) -> String {
    let (_, body, description) = note_parts(note);
    layout(
        Head {
            title: note.title.clone(),
            description: Some(description),
            robots: None,
        },
        &render_html(body),
    )
}

/// Print-ready page that opens the browser print dialog
pub fn print_page(note: &Note) -> String {
    let (_, body, _) = note_parts(note);
    let page = format!(
        "{}\n<script>window.addEventListener(\"load\", () => window.print());</script>",
        render_html(body)
    );
    layout(
        Head {
            title: generate_web_title(&note.title),
            description: None,
            robots: Some("noindex, nofollow"),
        },
        &page,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use notehub_common::models::Permission;
    use uuid::Uuid;

    fn note(content: &str) -> Note {
        Note {
            id: Uuid::new_v4(),
            shortid: "abcdefghij".to_string(),
            alias: None,
            title: "Hello <World>".to_string(),
            content: content.to_string(),
            permission: Permission::Freely,
            owner_id: None,
            last_change_user_id: None,
            viewcount: 3,
            tag_id_list: Vec::new(),
            authorship: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_change_at: None,
        }
    }

    #[test]
    fn test_publish_page_escapes_title_and_renders_body() {
        let html = publish_page(&note("# Hello\n\nSome *text*"));
        assert!(html.contains("<title>Hello &lt;World&gt; - notehub</title>"));
        assert!(html.contains("<em>text</em>"));
        assert!(html.contains("3 views"));
    }

    #[test]
    fn test_publish_page_uses_meta_robots() {
        let html = publish_page(&note("---\nrobots: noindex\n---\nbody"));
        assert!(html.contains(r#"<meta name="robots" content="noindex">"#));
    }

    #[test]
    fn test_slide_page_splits_sections() {
        let html = slide_page(&note("one\n---\ntwo"));
        assert_eq!(html.matches("<section class=\"slide\">").count(), 2);
    }

    #[test]
    fn test_editor_page_readonly() {
        let html = editor_page(&note("x"), false);
        assert!(html.contains(" readonly>"));
    }

    #[test]
    fn test_error_page() {
        let html = error_page(404, "Not Found");
        assert!(html.contains("<h1>404</h1>"));
    }
}
