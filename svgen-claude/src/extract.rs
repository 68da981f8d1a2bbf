const OPEN_TAG: &str = "<svg";
const CLOSE_TAG: &str = "</svg>";

/// Pull the first SVG document out of free-form model output.
///
/// The match starts at the first `<svg` followed by whitespace, `>` or `/`
/// and ends at the `</svg>` that balances it, so nested `<svg>` elements stay
/// inside the result. A self-closing root element is returned as-is. Anything
/// after the first document is ignored.
pub fn extract_svg(text: &str) -> Option<&str> {
    let start = find_open_tag(text)?;
    let rest = &text[start..];

    let tag_end = rest.find('>')?;
    if is_self_closing(&rest[..tag_end]) {
        return Some(&rest[..=tag_end]);
    }

    let mut depth = 1usize;
    let mut cursor = tag_end + 1;
    loop {
        let close = cursor + rest[cursor..].find(CLOSE_TAG)?;
        match find_open_tag(&rest[cursor..close]) {
            Some(found) => {
                let open = cursor + found;
                let open_end = open + rest[open..].find('>')?;
                if !is_self_closing(&rest[open..open_end]) {
                    depth += 1;
                }
                cursor = open_end + 1;
            }
            None => {
                depth -= 1;
                cursor = close + CLOSE_TAG.len();
                if depth == 0 {
                    return Some(&rest[..cursor]);
                }
            }
        }
    }
}

fn is_self_closing(tag: &str) -> bool {
    tag.ends_with('/')
}

fn find_open_tag(text: &str) -> Option<usize> {
    let mut offset = 0;
    while let Some(found) = text[offset..].find(OPEN_TAG) {
        let index = offset + found;
        let after = index + OPEN_TAG.len();
        match text[after..].chars().next() {
            Some(ch) if ch.is_whitespace() || ch == '>' || ch == '/' => return Some(index),
            _ => offset = after,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_document_is_returned_unchanged() {
        assert_eq!(extract_svg("<svg>A</svg>"), Some("<svg>A</svg>"));
    }

    #[test]
    fn surrounding_prose_and_fences_are_dropped() {
        let text = "Sure! Here it is:\n```svg\n<svg width=\"4\"><rect/></svg>\n```\nEnjoy.";
        assert_eq!(extract_svg(text), Some("<svg width=\"4\"><rect/></svg>"));
    }

    #[test]
    fn first_document_wins() {
        let text = "<svg id=\"a\"></svg> and <svg id=\"b\"></svg>";
        assert_eq!(extract_svg(text), Some("<svg id=\"a\"></svg>"));
    }

    #[test]
    fn lookalike_elements_are_skipped() {
        let text = "<svgfoo>nope</svgfoo><svg\n  viewBox=\"0 0 1 1\"></svg>";
        assert_eq!(extract_svg(text), Some("<svg\n  viewBox=\"0 0 1 1\"></svg>"));
    }

    #[test]
    fn closing_tag_before_opening_is_ignored() {
        let text = "</svg> stray <svg>B</svg>";
        assert_eq!(extract_svg(text), Some("<svg>B</svg>"));
    }

    #[test]
    fn self_closing_root_is_accepted() {
        assert_eq!(
            extract_svg("empty: <svg width=\"1\"/> done"),
            Some("<svg width=\"1\"/>")
        );
    }

    #[test]
    fn nested_svg_stays_inside_root() {
        let text = "<svg viewBox=\"0 0 10 10\"><svg x=\"1\"><rect/></svg><circle r=\"2\"/></svg>";
        assert_eq!(extract_svg(text), Some(text));
    }

    #[test]
    fn deeply_nested_document_ends_at_balancing_close() {
        let document = "<svg><svg><svg/><svg y=\"2\"><g/></svg></svg><path/></svg>";
        let text = format!("Here:\n{document}\ntrailing </svg> text");
        assert_eq!(extract_svg(&text), Some(document));
    }

    #[test]
    fn missing_markup_yields_none() {
        assert_eq!(extract_svg("I cannot draw that."), None);
        assert_eq!(extract_svg("<svg width=\"3\"><circle/>"), None);
        assert_eq!(extract_svg(""), None);
        assert_eq!(extract_svg("<svg><svg x=\"1\"></svg>"), None);
    }
}
