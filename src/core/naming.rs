//! Identifier and topic naming
//!
//! Pure helpers that turn free-text names into broker-safe identifiers and build
//! the deterministic topic strings shared by every device and function.
//!
//! ```text
//! home/<full_id>/availability
//! home/<full_id>/<clean_name>/set
//! home/<full_id>/<clean_name>/state
//! homeassistant/<component>/<full_id>/<clean_name>/config
//! ```

/// Characters stripped from names before they are used in topics or ids.
const STRIPPED_CHARACTERS: &str = "!@#$%^&*()[]{};:,./<>?\\|`~=+";

/// Root of every state, command and availability topic.
pub const STATE_ROOT: &str = "home";

/// Root of every discovery topic, as expected by Home Assistant.
pub const DISCOVERY_ROOT: &str = "homeassistant";

/// Turns a free-text name into a broker-safe identifier.
///
/// Punctuation is removed, spaces and hyphens become underscores and the
/// result is lowercased. A name that ends up empty becomes `"empty"`.
/// Applying it twice yields the same result as applying it once.
pub fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !STRIPPED_CHARACTERS.contains(*c))
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .flat_map(char::to_lowercase)
        .collect();

    if cleaned.is_empty() {
        "empty".to_string()
    } else {
        cleaned
    }
}

/// Discovery category of a function, the `<component>` segment of its config topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Light,
    Switch,
    Number,
    Sensor,
    Climate,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Light => "light",
            Component::Switch => "switch",
            Component::Number => "number",
            Component::Sensor => "sensor",
            Component::Climate => "climate",
        }
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `home/<full_id>/<clean_name>/`, the prefix of every state and command topic
/// owned by one function. Always ends in a slash.
pub fn base_topic(full_id: &str, clean_name: &str) -> String {
    format!("{STATE_ROOT}/{full_id}/{clean_name}/")
}

/// `home/<full_id>/availability`
pub fn availability_topic(full_id: &str) -> String {
    format!("{STATE_ROOT}/{full_id}/availability")
}

/// `homeassistant/<component>/<full_id>/<clean_name>/config`
pub fn discovery_topic(component: Component, full_id: &str, clean_name: &str) -> String {
    format!("{DISCOVERY_ROOT}/{component}/{full_id}/{clean_name}/config")
}

/// Splits a state/command topic into `(full_id, clean_name, rest)`.
///
/// Returns `None` for anything outside the `home/` tree or without a path
/// below the function segment. `rest` is that remaining path (`"set"`,
/// `"mode/set"`, ...).
pub fn split_topic(topic: &str) -> Option<(&str, &str, &str)> {
    let mut segments = topic.splitn(4, '/');
    if segments.next()? != STATE_ROOT {
        return None;
    }
    let full_id = segments.next()?;
    let clean_name = segments.next()?;
    let rest = segments.next()?;
    Some((full_id, clean_name, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_punctuation_and_lowercases() {
        assert_eq!(sanitize("Living Room (Main)!"), "living_room_main");
        assert_eq!(sanitize("Garage-Door"), "garage_door");
        assert_eq!(sanitize("Pump"), "pump");
        assert_eq!(sanitize("a.b/c:d"), "abcd");
    }

    #[test]
    fn sanitize_substitutes_empty() {
        assert_eq!(sanitize(""), "empty");
        assert_eq!(sanitize("!!!"), "empty");
        assert_eq!(sanitize("()[]{}"), "empty");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let names = [
            "",
            "Pump",
            "Living Room",
            "a - b",
            "ÄÖÜ Sensor",
            "Temp #1 (°C)",
            "__already_clean__",
            "empty",
            "MiXeD-CaSe_Name 42",
        ];
        for name in names {
            let once = sanitize(name);
            assert_eq!(sanitize(&once), once, "not idempotent for {name:?}");
            assert_eq!(once.to_lowercase(), once);
            assert!(!once.chars().any(|c| STRIPPED_CHARACTERS.contains(c)));
            assert!(!once.contains(' '));
            assert!(!once.contains('-'));
        }
    }

    #[test]
    fn topics_follow_layout() {
        assert_eq!(base_topic("abc_pump", "pump"), "home/abc_pump/pump/");
        assert_eq!(availability_topic("abc_pump"), "home/abc_pump/availability");
        assert_eq!(
            discovery_topic(Component::Switch, "abc_pump", "pump"),
            "homeassistant/switch/abc_pump/pump/config"
        );
    }

    #[test]
    fn split_topic_extracts_segments() {
        assert_eq!(
            split_topic("home/abc_pump/pump/set"),
            Some(("abc_pump", "pump", "set"))
        );
        assert_eq!(
            split_topic("home/abc/hvac/mode/set"),
            Some(("abc", "hvac", "mode/set"))
        );
        assert_eq!(split_topic("home/abc/availability"), None);
        assert_eq!(split_topic("homeassistant/switch/abc/pump/config"), None);
        assert_eq!(split_topic("home/abc"), None);
    }
}
