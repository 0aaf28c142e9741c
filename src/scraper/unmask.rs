use std::borrow::Cow;

const OPEN: &str = "<!--";
const CLOSE: &str = "-->";

/// Strip HTML comment delimiters so tables parked inside comments become
/// ordinary markup. Only the delimiters are removed; the text between them is
/// kept. Input without delimiters is returned borrowed and unchanged.
pub fn unmask_comments(html: &str) -> Cow<'_, str> {
    if !has_delimiter(html) {
        return Cow::Borrowed(html);
    }
    let mut out = html.replace(OPEN, "").replace(CLOSE, "");
    // "<!<!---->" collapses into a fresh delimiter; repeat until none remain
    while has_delimiter(&out) {
        out = out.replace(OPEN, "").replace(CLOSE, "");
    }
    Cow::Owned(out)
}

fn has_delimiter(s: &str) -> bool {
    s.contains(OPEN) || s.contains(CLOSE)
}
