use std::sync::LazyLock;

use regex::Regex;

/// Turns a title into a URL friendly slug: `"Héllo, World!"` becomes `hello-world`
///
/// Latin accented letters are folded to ASCII, any other character that isn't
/// alphanumeric separates words.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_separator = false;
    for c in title.chars().flat_map(char::to_lowercase) {
        let c = fold_accent(c);
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(c);
        } else if c != '\'' {
            pending_separator = true;
        }
    }
    slug
}

fn fold_accent(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

/// Letters, digits, dashes and underscores only
pub fn is_alpha_dash(value: &str) -> bool {
    static ALPHA_DASH: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[\p{L}\p{N}_-]+$").expect("alpha dash pattern is valid"));
    ALPHA_DASH.is_match(value)
}
