//! Naming utilities for catalog name resolution
//!
//! Model names arrive in whatever shape the caller has on hand ("authors",
//! "BlogPosts", "blog_post") and must normalize to one canonical singular
//! studly form before the class stack is probed.

use std::collections::HashMap;

use once_cell::sync::Lazy;

static IRREGULAR_SINGULAR: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("people", "person"),
        ("children", "child"),
        ("men", "man"),
        ("women", "woman"),
        ("mice", "mouse"),
        ("geese", "goose"),
        ("feet", "foot"),
        ("teeth", "tooth"),
        ("statuses", "status"),
        ("aliases", "alias"),
    ])
});

static IRREGULAR_PLURAL: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("person", "people"),
        ("child", "children"),
        ("man", "men"),
        ("woman", "women"),
        ("mouse", "mice"),
        ("goose", "geese"),
        ("foot", "feet"),
        ("tooth", "teeth"),
    ])
});

/// Plural form of a single lowercase word.
pub fn pluralize(word: &str) -> String {
    if let Some(p) = IRREGULAR_PLURAL.get(word) {
        return (*p).to_string();
    }
    if word.ends_with('y') && !ends_with_vowel_y(word) {
        format!("{}ies", &word[..word.len() - 1])
    } else if word.ends_with('s')
        || word.ends_with("sh")
        || word.ends_with("ch")
        || word.ends_with('x')
        || word.ends_with('z')
    {
        format!("{}es", word)
    } else {
        format!("{}s", word)
    }
}

/// Singular form of a single lowercase word.
pub fn singularize(word: &str) -> String {
    if let Some(s) = IRREGULAR_SINGULAR.get(word) {
        return (*s).to_string();
    }
    if word.ends_with("ies") && word.len() > 3 {
        format!("{}y", &word[..word.len() - 3])
    } else if (word.ends_with("shes") || word.ends_with("ches") || word.ends_with("xes") || word.ends_with("sses"))
        && word.len() > 4
    {
        word[..word.len() - 2].to_string()
    } else if word.ends_with('s') && !word.ends_with("ss") && word.len() > 1 {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

fn ends_with_vowel_y(word: &str) -> bool {
    let mut chars = word.chars().rev();
    let _y = chars.next();
    matches!(chars.next(), Some('a' | 'e' | 'i' | 'o' | 'u'))
}

/// `blog_post` -> `BlogPost`
pub fn studly(s: &str) -> String {
    s.split(|c| c == '_' || c == '-')
        .filter(|seg| !seg.is_empty())
        .map(|seg| {
            let mut chars = seg.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// `BlogPost` -> `blog_post`
pub fn underscore(s: &str) -> String {
    let mut result = String::new();
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() && i > 0 {
            result.push('_');
        }
        result.push(c.to_lowercase().next().unwrap_or(c));
    }
    result
}

/// Canonical model name: underscore, singularize the last segment, studly.
pub fn canonical(name: &str) -> String {
    let under = underscore(name);
    let mut segments: Vec<String> = under
        .split('_')
        .filter(|seg| !seg.is_empty())
        .map(|seg| seg.to_string())
        .collect();
    if let Some(last) = segments.last_mut() {
        *last = singularize(last);
    }
    studly(&segments.join("_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pluralize_basic_and_irregular() {
        assert_eq!(pluralize("post"), "posts");
        assert_eq!(pluralize("category"), "categories");
        assert_eq!(pluralize("day"), "days");
        assert_eq!(pluralize("box"), "boxes");
        assert_eq!(pluralize("person"), "people");
    }

    #[test]
    fn singularize_basic_and_irregular() {
        assert_eq!(singularize("posts"), "post");
        assert_eq!(singularize("categories"), "category");
        assert_eq!(singularize("boxes"), "box");
        assert_eq!(singularize("people"), "person");
        assert_eq!(singularize("status"), "status");
        assert_eq!(singularize("statuses"), "status");
    }

    #[test]
    fn case_conversions_round_trip() {
        assert_eq!(studly("blog_post"), "BlogPost");
        assert_eq!(underscore("BlogPost"), "blog_post");
        assert_eq!(underscore(&studly("author")), "author");
    }

    #[test]
    fn canonical_normalizes_any_shape() {
        assert_eq!(canonical("authors"), "Author");
        assert_eq!(canonical("BlogPosts"), "BlogPost");
        assert_eq!(canonical("blog_post"), "BlogPost");
        assert_eq!(canonical("Author"), "Author");
    }
}
