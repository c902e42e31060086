use serde::{Deserialize, Serialize};

/// Terminal category of a pin type (the type of one element of a container).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinCategory {
    Exec,
    Wildcard,
    Boolean,
    Int,
    Float,
    Name,
    String,
    Text,
    Object(String),
    Struct(String),
    Delegate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ContainerType {
    #[default]
    None,
    Array,
    Set,
    Map,
}

/// Full type of a pin.
///
/// Maps keep their key type in `category` and their value type in
/// `value_terminal`, so `Map<name, int>` is `{ category: Name, container: Map,
/// value_terminal: Some(Int) }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PinType {
    pub category: PinCategory,
    pub container: ContainerType,
    pub value_terminal: Option<PinCategory>,
    pub is_const: bool,
    pub is_reference: bool,
}

impl Default for PinType {
    fn default() -> Self {
        Self::wildcard()
    }
}

impl PinType {
    pub fn terminal(category: PinCategory) -> Self {
        Self {
            category,
            container: ContainerType::None,
            value_terminal: None,
            is_const: false,
            is_reference: false,
        }
    }

    pub fn exec() -> Self {
        Self::terminal(PinCategory::Exec)
    }

    pub fn wildcard() -> Self {
        Self::terminal(PinCategory::Wildcard)
    }

    pub fn boolean() -> Self {
        Self::terminal(PinCategory::Boolean)
    }

    pub fn int() -> Self {
        Self::terminal(PinCategory::Int)
    }

    pub fn float() -> Self {
        Self::terminal(PinCategory::Float)
    }

    pub fn string() -> Self {
        Self::terminal(PinCategory::String)
    }

    pub fn name() -> Self {
        Self::terminal(PinCategory::Name)
    }

    pub fn object(class: impl Into<String>) -> Self {
        Self::terminal(PinCategory::Object(class.into()))
    }

    pub fn delegate() -> Self {
        Self::terminal(PinCategory::Delegate)
    }

    pub fn array_of(element: PinCategory) -> Self {
        Self {
            container: ContainerType::Array,
            ..Self::terminal(element)
        }
    }

    pub fn set_of(element: PinCategory) -> Self {
        Self {
            container: ContainerType::Set,
            ..Self::terminal(element)
        }
    }

    pub fn map_of(key: PinCategory, value: PinCategory) -> Self {
        Self {
            container: ContainerType::Map,
            value_terminal: Some(value),
            ..Self::terminal(key)
        }
    }

    pub fn wildcard_array() -> Self {
        Self::array_of(PinCategory::Wildcard)
    }

    pub fn wildcard_map() -> Self {
        Self::map_of(PinCategory::Wildcard, PinCategory::Wildcard)
    }

    /// Marks the type as a const reference, the way container inputs are passed.
    pub fn as_const_ref(mut self) -> Self {
        self.is_const = true;
        self.is_reference = true;
        self
    }

    pub fn is_exec(&self) -> bool {
        self.category == PinCategory::Exec
    }

    pub fn is_wildcard(&self) -> bool {
        self.category == PinCategory::Wildcard
    }

    /// A wildcard with no container shape; accepts any non-container data type.
    pub fn is_bare_wildcard(&self) -> bool {
        self.is_wildcard() && self.container == ContainerType::None
    }

    pub fn is_container(&self) -> bool {
        self.container != ContainerType::None
    }

    /// Type of one element of this container. For maps this is the key type.
    pub fn terminal_type_for_container(&self) -> PinType {
        Self::terminal(self.category.clone())
    }

    /// Plain pin type for a terminal category, used for map values.
    pub fn pin_type_for_terminal(terminal: &PinCategory) -> PinType {
        Self::terminal(terminal.clone())
    }

    /// Value type of a map; wildcard for anything that isn't a map.
    pub fn map_value_type(&self) -> PinType {
        match (&self.container, &self.value_terminal) {
            (ContainerType::Map, Some(value)) => Self::pin_type_for_terminal(value),
            _ => Self::wildcard(),
        }
    }

    /// Whether a link between pins of these two types is allowed.
    pub fn is_compatible_with(&self, other: &PinType) -> bool {
        if self.is_exec() || other.is_exec() {
            return self.is_exec() && other.is_exec();
        }

        if self.container != other.container {
            return false;
        }

        if self.is_bare_wildcard() || other.is_bare_wildcard() {
            return true;
        }

        if !terminals_compatible(&self.category, &other.category) {
            return false;
        }

        if self.container == ContainerType::Map {
            return match (&self.value_terminal, &other.value_terminal) {
                (Some(a), Some(b)) => terminals_compatible(a, b),
                _ => true,
            };
        }

        true
    }

    /// Parse a type string into a pin type.
    ///
    /// Accepts display names (`Array<int>`, `Map<name, float>`) as well as
    /// native names (`Vec<i32>`, `HashMap<String, f32>`, `&str`). `?`, `_` and
    /// single uppercase letters are wildcards.
    pub fn parse(type_str: &str) -> Self {
        let mut remaining = type_str.trim();
        let mut is_reference = false;
        let mut is_const = false;

        if let Some(inner) = remaining.strip_prefix("&mut ") {
            is_reference = true;
            remaining = inner.trim();
        } else if remaining != "&str" {
            if let Some(inner) = remaining.strip_prefix('&') {
                is_reference = true;
                is_const = true;
                remaining = inner.trim();
            }
        }

        let mut pin_type = if let Some(inner) = Self::extract_wrapper(remaining, &["Array<", "Vec<"]) {
            Self::array_of(parse_terminal(inner))
        } else if let Some(inner) = Self::extract_wrapper(remaining, &["Set<", "HashSet<"]) {
            Self::set_of(parse_terminal(inner))
        } else if let Some(inner) = Self::extract_wrapper(remaining, &["Map<", "HashMap<"]) {
            match split_top_level(inner) {
                Some((key, value)) => Self::map_of(parse_terminal(key), parse_terminal(value)),
                None => Self::wildcard_map(),
            }
        } else {
            Self::terminal(parse_terminal(remaining))
        };

        pin_type.is_reference = is_reference;
        pin_type.is_const = is_const;
        pin_type
    }

    fn extract_wrapper<'a>(type_str: &'a str, prefixes: &[&str]) -> Option<&'a str> {
        prefixes.iter().find_map(|prefix| {
            type_str
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_suffix('>'))
                .map(str::trim)
        })
    }
}

fn terminals_compatible(a: &PinCategory, b: &PinCategory) -> bool {
    *a == PinCategory::Wildcard || *b == PinCategory::Wildcard || a == b
}

/// Split `K, V` at the first comma that is not nested inside angle brackets.
fn split_top_level(inner: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    for (index, ch) in inner.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => return Some((inner[..index].trim(), inner[index + 1..].trim())),
            _ => {}
        }
    }
    None
}

fn parse_terminal(name: &str) -> PinCategory {
    let name = name.trim();
    match name {
        "?" | "_" | "wildcard" => PinCategory::Wildcard,
        "exec" | "execution" => PinCategory::Exec,
        "bool" | "boolean" => PinCategory::Boolean,
        "int" | "i8" | "i16" | "i32" | "i64" | "u8" | "u16" | "u32" | "u64" | "usize" | "isize" => {
            PinCategory::Int
        }
        "float" | "f32" | "f64" => PinCategory::Float,
        "name" | "Name" => PinCategory::Name,
        "string" | "String" | "&str" => PinCategory::String,
        "text" | "Text" => PinCategory::Text,
        "delegate" => PinCategory::Delegate,
        _ => {
            if name.len() == 1 && name.chars().all(|c| c.is_ascii_uppercase()) {
                return PinCategory::Wildcard;
            }
            if let Some(class) = name.strip_prefix("Object<").and_then(|rest| rest.strip_suffix('>')) {
                return PinCategory::Object(class.trim().to_string());
            }
            if name.contains('<') {
                tracing::warn!("[TYPES] Nested container '{}' flattened to wildcard", name);
                return PinCategory::Wildcard;
            }
            PinCategory::Struct(name.to_string())
        }
    }
}

impl std::fmt::Display for PinCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PinCategory::Exec => write!(f, "exec"),
            PinCategory::Wildcard => write!(f, "?"),
            PinCategory::Boolean => write!(f, "bool"),
            PinCategory::Int => write!(f, "int"),
            PinCategory::Float => write!(f, "float"),
            PinCategory::Name => write!(f, "name"),
            PinCategory::String => write!(f, "string"),
            PinCategory::Text => write!(f, "text"),
            PinCategory::Object(class) => write!(f, "Object<{}>", class),
            PinCategory::Struct(name) => write!(f, "{}", name),
            PinCategory::Delegate => write!(f, "delegate"),
        }
    }
}

impl std::fmt::Display for PinType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_reference {
            if self.is_const {
                write!(f, "&")?;
            } else {
                write!(f, "&mut ")?;
            }
        }

        match self.container {
            ContainerType::None => write!(f, "{}", self.category),
            ContainerType::Array => write!(f, "Array<{}>", self.category),
            ContainerType::Set => write!(f, "Set<{}>", self.category),
            ContainerType::Map => {
                let value = self.value_terminal.clone().unwrap_or(PinCategory::Wildcard);
                write!(f, "Map<{}, {}>", self.category, value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_parsing() {
        assert_eq!(PinType::parse("i32"), PinType::int());
        assert_eq!(PinType::parse("String"), PinType::string());

        let vec_type = PinType::parse("Vec<i32>");
        assert_eq!(vec_type.category, PinCategory::Int);
        assert_eq!(vec_type.container, ContainerType::Array);

        let map_type = PinType::parse("HashMap<String, f32>");
        assert_eq!(map_type.category, PinCategory::String);
        assert_eq!(map_type.value_terminal, Some(PinCategory::Float));

        let reference = PinType::parse("&Vec<?>");
        assert!(reference.is_const && reference.is_reference);
        assert!(reference.is_wildcard());

        let wildcard = PinType::parse("?");
        assert!(wildcard.is_bare_wildcard());
        assert!(PinType::parse("T").is_wildcard());

        assert_eq!(PinType::parse("Object<Player>").category, PinCategory::Object("Player".into()));
    }

    #[test]
    fn test_type_compatibility() {
        let int_type = PinType::int();
        let float_type = PinType::float();
        let wildcard = PinType::wildcard();

        assert!(wildcard.is_compatible_with(&int_type));
        assert!(int_type.is_compatible_with(&wildcard));
        assert!(int_type.is_compatible_with(&int_type));
        assert!(!int_type.is_compatible_with(&float_type));

        // Exec only ever links to exec
        assert!(!PinType::exec().is_compatible_with(&wildcard));
        assert!(PinType::exec().is_compatible_with(&PinType::exec()));

        // Container shape must always agree
        let int_array = PinType::array_of(PinCategory::Int);
        assert!(PinType::wildcard_array().is_compatible_with(&int_array));
        assert!(!PinType::wildcard_array().is_compatible_with(&PinType::wildcard_map()));
        assert!(!int_array.is_compatible_with(&int_type));
        assert!(!wildcard.is_compatible_with(&int_array));
        assert!(!PinType::wildcard_array().is_compatible_with(&wildcard));

        let name_to_int = PinType::map_of(PinCategory::Name, PinCategory::Int);
        let name_to_float = PinType::map_of(PinCategory::Name, PinCategory::Float);
        assert!(PinType::wildcard_map().is_compatible_with(&name_to_int));
        assert!(!name_to_int.is_compatible_with(&name_to_float));
    }

    #[test]
    fn test_container_terminals() {
        let map = PinType::map_of(PinCategory::Name, PinCategory::Int).as_const_ref();
        assert_eq!(map.terminal_type_for_container(), PinType::name());
        assert_eq!(map.map_value_type(), PinType::int());

        let array = PinType::array_of(PinCategory::String);
        assert_eq!(array.terminal_type_for_container(), PinType::string());
        assert_eq!(array.map_value_type(), PinType::wildcard());
    }

    #[test]
    fn test_display() {
        assert_eq!(PinType::int().to_string(), "int");
        assert_eq!(PinType::parse("Vec<i32>").to_string(), "Array<int>");
        assert_eq!(PinType::parse("HashMap<String, bool>").to_string(), "Map<string, bool>");
        assert_eq!(PinType::wildcard().to_string(), "?");
        assert_eq!(PinType::wildcard_array().as_const_ref().to_string(), "&Array<?>");
    }
}
