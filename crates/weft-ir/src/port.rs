use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Data type tag carried by ports, memory cells, and constants.
///
/// Tags are opaque names ("String", "int", ...). The compiler never interprets
/// them; it only propagates them from declarations to the generated protocol
/// components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct TypeTag(String);

impl TypeTag {
    pub fn new(tag: impl Into<String>) -> Self {
        TypeTag(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of data flow through a port, seen from the connector that
/// declares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn reversed(self) -> Self {
        match self {
            Direction::In => Direction::Out,
            Direction::Out => Direction::In,
        }
    }
}

/// Priority class of a port. Routing nodes prefer draining high-priority
/// ports when several rules are enabled at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum Priority {
    #[default]
    None,
    High,
    Low,
}

/// A named, directed, typed connection point.
///
/// Ports are compared, hashed, and ordered by name only: two ports with the
/// same name denote the same connection point even when one side has not
/// resolved the type tag yet. Direction, priority, and type tag never change
/// after creation; renaming and hiding produce a new `Port` with the same
/// role.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Port {
    name: String,
    direction: Direction,
    priority: Priority,
    tag: Option<TypeTag>,
    hidden: bool,
}

impl Port {
    pub fn new(name: impl Into<String>, direction: Direction) -> Self {
        Port {
            name: name.into(),
            direction,
            priority: Priority::None,
            tag: None,
            hidden: false,
        }
    }

    pub fn input(name: impl Into<String>) -> Self {
        Port::new(name, Direction::In)
    }

    pub fn output(name: impl Into<String>) -> Self {
        Port::new(name, Direction::Out)
    }

    pub fn with_tag(mut self, tag: TypeTag) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn tag(&self) -> Option<&TypeTag> {
        self.tag.as_ref()
    }

    pub fn is_input(&self) -> bool {
        self.direction == Direction::In
    }

    pub fn is_output(&self) -> bool {
        self.direction == Direction::Out
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// A port with the same role but a different name.
    pub fn rename(&self, name: impl Into<String>) -> Self {
        let mut p = self.clone();
        p.name = name.into();
        p
    }

    /// A port flagged as invisible at the enclosing interface. The port is
    /// not deleted: its behavior still constrains the protocol.
    pub fn hide(&self) -> Self {
        let mut p = self.clone();
        p.hidden = true;
        p
    }

    /// The same connection point seen from the opposite side (a producer's
    /// output is a consumer's input).
    pub fn reversed(&self) -> Self {
        let mut p = self.clone();
        p.direction = self.direction.reversed();
        p
    }

    /// Apply a rename-map entry: take name and hidden flag from `target`,
    /// keep this port's direction and priority, and keep this port's type
    /// tag unless only the target carries one.
    pub fn follow(&self, target: &Port) -> Self {
        Port {
            name: target.name.clone(),
            direction: self.direction,
            priority: self.priority,
            tag: self.tag.clone().or_else(|| target.tag.clone()),
            hidden: target.hidden,
        }
    }
}

impl PartialEq for Port {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Port {}

impl Hash for Port {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl PartialOrd for Port {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Port {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self.direction {
            Direction::In => "?",
            Direction::Out => "!",
        };
        write!(f, "{}{marker}", self.name)
    }
}
