use pulldown_cmark::*;
use url::{ParseError as UrlParseError, Url};

const MARKDOWN_EXTENSION: &str = ".md";
const HTML_EXTENSION: &str = ".html";

/// Converts markdown to HTML. Relative links to other markdown files are
/// rewritten to point at the corresponding `.html` files, since that is what
/// they are built into.
pub fn to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_SMART_PUNCTUATION);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut output = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(
        &mut output,
        Parser::new_ext(markdown, options).map(convert_event),
    );
    output
}

fn convert_event(ev: Event) -> Event {
    match ev {
        Event::Start(Tag::Link(link, url, title)) => {
            let url = match convert_link(&url) {
                Some(converted) => CowStr::Boxed(converted.into_boxed_str()),
                None => url,
            };
            Event::Start(Tag::Link(link, url, title))
        }
        _ => ev,
    }
}

/// Returns the `.html` equivalent of `url` if it is a relative link to a
/// markdown file, keeping any query and fragment.
fn convert_link(url: &str) -> Option<String> {
    match Url::parse(url) {
        Err(UrlParseError::RelativeUrlWithoutBase) => {}
        _ => return None,
    }

    let (path, suffix) = match url.find(|c| c == '?' || c == '#') {
        Some(i) => url.split_at(i),
        None => (url, ""),
    };
    path.strip_suffix(MARKDOWN_EXTENSION)
        .map(|stem| format!("{}{}{}", stem, HTML_EXTENSION, suffix))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_convert_relative_markdown_links() {
        assert_eq!(Some(String::from("notes.html")), convert_link("notes.md"));
        assert_eq!(
            Some(String::from("../math/sets.html#unions")),
            convert_link("../math/sets.md#unions")
        );
        assert_eq!(
            Some(String::from("/items/a.html?raw=1")),
            convert_link("/items/a.md?raw=1")
        );
    }

    #[test]
    fn test_other_links_are_untouched() {
        assert_eq!(None, convert_link("https://example.org/readme.md"));
        assert_eq!(None, convert_link("notes.mdx"));
        assert_eq!(None, convert_link("#section.md"));
        assert_eq!(None, convert_link("image.png"));
    }

    #[test]
    fn test_to_html() {
        let html = to_html("# Title\n\nSee [the notes](notes.md).\n");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains(r#"<a href="notes.html">the notes</a>"#));
    }
}
