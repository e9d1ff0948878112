//! Case-convention transforms between code names and database names.
//!
//! All functions are pure. An empty input yields an empty output; callers that
//! need a non-empty identifier validate it themselves.

/// `helloWorld` -> `HelloWorld`.
pub fn lower_camel_to_upper_camel(lower_camel: &str) -> String {
    let mut chars = lower_camel.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `HelloWorld` -> `helloWorld`.
pub fn upper_camel_to_lower_camel(upper_camel: &str) -> String {
    let mut chars = upper_camel.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Converts lower or upper camel case to snake case.
///
/// A separator is inserted before every upper-case character except the first
/// one, so `helloWorld` and `HelloWorld` both become `hello_world`
/// (`HELLO_WORLD` when `upper` is set).
pub fn camel_to_snake(camel: &str, upper: bool) -> String {
    let mut out = String::with_capacity(camel.len() + 4);
    for (i, ch) in camel.chars().enumerate() {
        if ch.is_uppercase() && i > 0 {
            out.push('_');
        }
        if upper {
            out.extend(ch.to_uppercase());
        } else {
            out.extend(ch.to_lowercase());
        }
    }
    out
}

pub fn camel_to_lower_snake(camel: &str) -> String {
    camel_to_snake(camel, false)
}

pub fn camel_to_upper_snake(camel: &str) -> String {
    camel_to_snake(camel, true)
}

/// Converts lower or upper snake case to camel case.
///
/// Empty segments (leading, trailing or doubled separators) are dropped. Each
/// segment is lower-cased and capitalised, except the first one when `upper`
/// is false, which stays fully lower-case.
pub fn snake_to_camel(snake: &str, upper: bool) -> String {
    let mut out = String::with_capacity(snake.len());
    let mut first_word = true;
    for word in snake.split('_').filter(|word| !word.is_empty()) {
        let lowered = word.to_lowercase();
        if first_word && !upper {
            out.push_str(&lowered);
        } else {
            out.push_str(&lower_camel_to_upper_camel(&lowered));
        }
        first_word = false;
    }
    out
}

pub fn snake_to_lower_camel(snake: &str) -> String {
    snake_to_camel(snake, false)
}

pub fn snake_to_upper_camel(snake: &str) -> String {
    snake_to_camel(snake, true)
}

pub fn lower_snake_to_upper_snake(lower_snake: &str) -> String {
    lower_snake.to_uppercase()
}

pub fn upper_snake_to_lower_snake(upper_snake: &str) -> String {
    upper_snake.to_lowercase()
}

/// Whether `name` is usable as a procedure, field or column identifier:
/// non-empty ASCII alphanumerics and underscores, not starting with a digit.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        }
        _ => false,
    }
}
