use crate::error::{Error, Result};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

const MAX_ID_LEN: usize = 128;

fn validate_identifier(value: &str, kind: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidId(format!("{kind} must not be empty")));
    }
    if trimmed.len() > MAX_ID_LEN {
        return Err(Error::InvalidId(format!(
            "{kind} length must be <= {MAX_ID_LEN}"
        )));
    }
    if let Some(bad) = trimmed.chars().find(|ch| !is_identifier_char(*ch)) {
        return Err(Error::InvalidId(format!(
            "{kind} contains invalid character {bad:?}"
        )));
    }
    Ok(trimmed.to_string())
}

fn is_identifier_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, ':' | '_' | '-' | '.' | '@')
}

macro_rules! define_id_type {
    ($(#[$doc:meta])* $name:ident, $kind:expr) => {
        $(#[$doc])*
        #[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(transparent))]
        pub struct $name(String);

        impl $name {
            /// Creates a validated identifier.
            pub fn new(value: impl AsRef<str>) -> Result<Self> {
                validate_identifier(value.as_ref(), $kind).map(Self)
            }

            /// Wraps a string that was validated by its producer (e.g. a repository row).
            pub fn from_trusted(value: String) -> Self {
                Self(value)
            }

            /// Returns the underlying string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<&str> for $name {
            type Error = Error;

            fn try_from(value: &str) -> Result<Self> {
                Self::new(value)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(value: &str) -> Result<Self> {
                Self::new(value)
            }
        }
    };
}

define_id_type!(
    /// Authenticated principal (user) identifier.
    PrincipalId,
    "principal id"
);
define_id_type!(
    /// Identifier of one entity instance, unique within its [`EntityType`].
    EntityId,
    "entity id"
);
define_id_type!(
    /// Stable role identifier referenced by assignments.
    RoleId,
    "role id"
);
define_id_type!(
    /// Unique human-facing role name used by assignment requests.
    RoleName,
    "role name"
);

/// Closed set of entity kinds that can carry scoped role grants.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum EntityType {
    /// Top-level organization owning venues and agencies.
    Organization,
    /// Physical venue.
    Venue,
    /// Event hosted by a venue or organization.
    Event,
    /// Agency representing performing artists.
    PerformanceAgency,
    /// Agency supplying event staff.
    StaffingAgency,
    /// Site map attached to an event or venue.
    SiteMap,
    /// Artist profile.
    Artist,
}

impl EntityType {
    /// All entity types.
    pub const ALL: [EntityType; 7] = [
        EntityType::Organization,
        EntityType::Venue,
        EntityType::Event,
        EntityType::PerformanceAgency,
        EntityType::StaffingAgency,
        EntityType::SiteMap,
        EntityType::Artist,
    ];

    /// Returns the canonical snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Organization => "organization",
            Self::Venue => "venue",
            Self::Event => "event",
            Self::PerformanceAgency => "performance_agency",
            Self::StaffingAgency => "staffing_agency",
            Self::SiteMap => "site_map",
            Self::Artist => "artist",
        }
    }

    /// Entity types that may appear as the direct parent of this type.
    ///
    /// Parent links outside this set are ignored during hierarchy walks.
    pub fn parent_types(&self) -> &'static [EntityType] {
        match self {
            Self::Organization => &[],
            Self::Venue => &[Self::Organization],
            Self::Event => &[Self::Venue, Self::Organization],
            Self::PerformanceAgency => &[Self::Organization],
            Self::StaffingAgency => &[Self::Organization],
            Self::SiteMap => &[Self::Event, Self::Venue],
            Self::Artist => &[Self::PerformanceAgency],
        }
    }

    /// Returns whether `parent` is a legal direct parent of this type.
    pub fn accepts_parent(&self, parent: EntityType) -> bool {
        self.parent_types().contains(&parent)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = Error;

    /// Parses any casing of the type name, with or without underscores
    /// (`"Event"`, `"site_map"`, `"SiteMap"`, `"PERFORMANCE_AGENCY"`).
    fn from_str(value: &str) -> Result<Self> {
        let folded: String = value
            .trim()
            .chars()
            .filter(|ch| *ch != '_' && *ch != '-')
            .map(|ch| ch.to_ascii_lowercase())
            .collect();
        match folded.as_str() {
            "organization" => Ok(Self::Organization),
            "venue" => Ok(Self::Venue),
            "event" => Ok(Self::Event),
            "performanceagency" => Ok(Self::PerformanceAgency),
            "staffingagency" => Ok(Self::StaffingAgency),
            "sitemap" => Ok(Self::SiteMap),
            "artist" => Ok(Self::Artist),
            _ => Err(Error::InvalidEntityType(value.to_string())),
        }
    }
}

impl TryFrom<&str> for EntityType {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        value.parse()
    }
}

/// Reference to one entity instance.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntityRef {
    /// Entity kind.
    pub entity_type: EntityType,
    /// Entity instance id.
    pub entity_id: EntityId,
}

impl EntityRef {
    /// Creates a reference from typed parts.
    pub fn new(entity_type: EntityType, entity_id: EntityId) -> Self {
        Self {
            entity_type,
            entity_id,
        }
    }

    /// Parses a reference from boundary strings.
    pub fn parse(entity_type: &str, entity_id: &str) -> Result<Self> {
        Ok(Self::new(entity_type.parse()?, EntityId::new(entity_id)?))
    }

    /// Shorthand for an organization reference.
    pub fn organization(id: EntityId) -> Self {
        Self::new(EntityType::Organization, id)
    }

    /// Shorthand for a venue reference.
    pub fn venue(id: EntityId) -> Self {
        Self::new(EntityType::Venue, id)
    }

    /// Shorthand for an event reference.
    pub fn event(id: EntityId) -> Self {
        Self::new(EntityType::Event, id)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.entity_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_type_parses_loose_casing() {
        assert_eq!("Event".parse::<EntityType>().unwrap(), EntityType::Event);
        assert_eq!("site_map".parse::<EntityType>().unwrap(), EntityType::SiteMap);
        assert_eq!("SiteMap".parse::<EntityType>().unwrap(), EntityType::SiteMap);
        assert_eq!(
            "PerformanceAgency".parse::<EntityType>().unwrap(),
            EntityType::PerformanceAgency
        );
        assert_eq!(
            " staffing_agency ".parse::<EntityType>().unwrap(),
            EntityType::StaffingAgency
        );
    }

    #[test]
    fn entity_type_rejects_unknown_names() {
        let err = "Venu".parse::<EntityType>().expect_err("must reject");
        assert!(matches!(err, Error::InvalidEntityType(_)));
    }

    #[test]
    fn canonical_name_round_trips() {
        for entity_type in EntityType::ALL {
            assert_eq!(entity_type.as_str().parse::<EntityType>().unwrap(), entity_type);
        }
    }

    #[test]
    fn event_accepts_venue_parent_but_not_artist() {
        assert!(EntityType::Event.accepts_parent(EntityType::Venue));
        assert!(!EntityType::Event.accepts_parent(EntityType::Artist));
        assert!(EntityType::Organization.parent_types().is_empty());
    }

    #[test]
    fn principal_id_rejects_whitespace_inside() {
        let err = PrincipalId::new("user 1").expect_err("must reject");
        assert!(err.to_string().contains("principal id"));
    }

    #[test]
    fn entity_ref_parse_reports_bad_type() {
        let err = EntityRef::parse("Stage", "s1").expect_err("must reject");
        assert!(matches!(err, Error::InvalidEntityType(_)));
        let venue = EntityRef::parse("Venue", "v1").unwrap();
        assert_eq!(venue.to_string(), "venue/v1");
    }
}
