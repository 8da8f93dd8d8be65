//! Enumerated query options
//!
//! Each option type only admits the values the APIC accepts for its query
//! parameter, so an invalid value is rejected when it is parsed rather than
//! when the query runs.

use crate::error::AciError;
use std::fmt;
use std::str::FromStr;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $what:literal {
            $( $variant:ident => $wire:literal $(| $alias:literal)* ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $variant ),+
        }

        impl $name {
            /// Every accepted wire value
            pub const VALUES: &'static [&'static str] = &[$( $wire ),+];

            /// Wire form of the value
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $wire ),+
                }
            }
        }

        impl FromStr for $name {
            type Err = AciError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $( $wire $(| $alias)* => Ok(Self::$variant), )+
                    other => Err(AciError::InvalidQueryOption(format!(
                        "{other:?} is not a valid {}, expected one of {}",
                        $what,
                        Self::VALUES.join(", ")
                    ))),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_enum! {
    /// `query-target`: which objects of the scope are returned
    QueryTarget, "query target" {
        SelfOnly => "self",
        Children => "children",
        Subtree => "subtree",
    }
}

wire_enum! {
    /// `rsp-prop-include`: which properties are returned
    PropInclude, "property include" {
        All => "all",
        NamingOnly => "naming-only" | "naming" | "name",
        ConfigOnly => "config-only" | "config",
    }
}

wire_enum! {
    /// `rsp-subtree`: how much of each object's subtree is returned
    SubtreeMode, "subtree mode" {
        No => "no",
        Children => "children",
        Full => "full" | "true",
    }
}

wire_enum! {
    /// First half of `rsp-subtree-include`
    IncludeDirective, "subtree include" {
        Faults => "faults",
        Health => "health",
        Stats => "stats",
        FaultRecords => "fault-records",
        HealthRecords => "health-records",
        AuditLogs => "audit-logs",
        EventLogs => "event-logs",
        Relations => "relations",
        RelationsWithParent => "relations-with-parent",
        NoScoped => "no-scoped",
        Subtree => "subtree",
        Deployment => "deployment",
        PortDeployment => "port-deployment",
        FullDeployment => "full-deployment",
        Required => "required",
        Count => "count",
        FaultCount => "fault-count",
        Tasks => "tasks",
        DeploymentRecords => "deployment-records",
        EpRecords => "ep-records",
    }
}

wire_enum! {
    /// Optional second half of `rsp-subtree-include`
    IncludeOption, "subtree include option" {
        Count => "count",
        NoScoped => "no-scoped",
        Required => "required",
    }
}

/// `rsp-subtree-include`: a directive with an optional modifier, e.g. `faults,count`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubtreeInclude {
    pub directive: IncludeDirective,
    pub option: Option<IncludeOption>,
}

impl SubtreeInclude {
    pub fn new(directive: IncludeDirective) -> Self {
        Self {
            directive,
            option: None,
        }
    }

    #[must_use]
    pub fn with_option(self, option: IncludeOption) -> Self {
        Self {
            option: Some(option),
            ..self
        }
    }
}

impl From<IncludeDirective> for SubtreeInclude {
    fn from(directive: IncludeDirective) -> Self {
        Self::new(directive)
    }
}

impl FromStr for SubtreeInclude {
    type Err = AciError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(',');
        let directive = parts.next().unwrap_or_default().parse()?;
        let option = parts.next().map(str::parse).transpose()?;
        if parts.next().is_some() {
            return Err(AciError::InvalidQueryOption(format!(
                "{s:?} has more than one subtree include option"
            )));
        }
        Ok(Self { directive, option })
    }
}

impl fmt::Display for SubtreeInclude {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.option {
            Some(option) => write!(f, "{},{}", self.directive, option),
            None => write!(f, "{}", self.directive),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets() {
        assert_eq!("self".parse::<QueryTarget>().unwrap(), QueryTarget::SelfOnly);
        assert_eq!("Subtree".parse::<QueryTarget>().unwrap(), QueryTarget::Subtree);
        assert!(matches!("everything".parse::<QueryTarget>(), Err(AciError::InvalidQueryOption(_))));
    }

    #[test]
    fn test_aliases() {
        assert_eq!("naming".parse::<PropInclude>().unwrap(), PropInclude::NamingOnly);
        assert_eq!("name".parse::<PropInclude>().unwrap().as_str(), "naming-only");
        assert_eq!("config".parse::<PropInclude>().unwrap(), PropInclude::ConfigOnly);
        assert_eq!("true".parse::<SubtreeMode>().unwrap(), SubtreeMode::Full);
        assert!("some".parse::<PropInclude>().is_err());
    }

    #[test]
    fn test_subtree_include() {
        let include: SubtreeInclude = "faults,count".parse().unwrap();
        assert_eq!(include.directive, IncludeDirective::Faults);
        assert_eq!(include.option, Some(IncludeOption::Count));
        assert_eq!(include.to_string(), "faults,count");

        let plain: SubtreeInclude = "relations-with-parent".parse().unwrap();
        assert_eq!(plain.option, None);
        assert_eq!(plain.to_string(), "relations-with-parent");

        assert!("faults,health".parse::<SubtreeInclude>().is_err());
        assert!("colors".parse::<SubtreeInclude>().is_err());
        assert!("faults,count,required".parse::<SubtreeInclude>().is_err());
        assert!("".parse::<SubtreeInclude>().is_err());
    }
}
