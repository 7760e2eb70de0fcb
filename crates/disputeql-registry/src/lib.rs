//! Sandbox whitelist: the only names, attributes and methods a query may touch

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Identifier bound to the combined dataset
pub const DATASET_IDENT: &str = "df_combined";
/// Identifier bound to the date/time and table namespace
pub const PANDAS_IDENT: &str = "pd";
/// Builtin length function
pub const LEN_IDENT: &str = "len";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    #[error("name '{0}' is not defined")]
    UnknownName(String),

    #[error("access to private attribute '{0}' is not allowed")]
    PrivateMember(String),

    #[error("'{kind}' object has no attribute '{name}'")]
    UnknownMember { kind: Kind, name: String },

    #[error("method '{name}' of '{kind}' must be called")]
    MethodReference { kind: Kind, name: String },

    #[error("'{kind}.{name}' is not callable")]
    NotCallable { kind: Kind, name: String },

    #[error("{name}() missing required argument: '{param}'")]
    MissingArgument { name: String, param: String },

    #[error("{name}() takes at most {max} positional arguments but {given} were given")]
    TooManyArguments { name: String, max: usize, given: usize },

    #[error("{name}() got an unexpected keyword argument '{keyword}'")]
    UnexpectedKeyword { name: String, keyword: String },

    #[error("{name}() got multiple values for argument '{param}'")]
    DuplicateArgument { name: String, param: String },
}

/// Receiver categories the whitelist is keyed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Builtins,
    Pandas,
    TimestampClass,
    Frame,
    Series,
    GroupBy,
    GroupByColumn,
    Grouped,
    DtAccessor,
    StrAccessor,
    Scalar,
    Shape,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Builtins => "builtins",
            Kind::Pandas => "module",
            Kind::TimestampClass => "type",
            Kind::Frame => "DataFrame",
            Kind::Series => "Series",
            Kind::GroupBy => "DataFrameGroupBy",
            Kind::GroupByColumn => "SeriesGroupBy",
            Kind::Grouped => "Series",
            Kind::DtAccessor => "DatetimeProperties",
            Kind::StrAccessor => "StringMethods",
            Kind::Scalar => "scalar",
            Kind::Shape => "tuple",
        };
        write!(f, "{}", name)
    }
}

/// What a top-level identifier refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Dataset,
    Pandas,
    Len,
}

/// Shape of a whitelisted member
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Member {
    Attribute,
    Method {
        params: &'static [&'static str],
        /// Leading params that must be supplied
        required: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberSignature {
    pub kind: Kind,
    pub name: &'static str,
    pub member: Member,
}

/// Where a bound parameter's value comes from in the call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgSlot {
    Positional(usize),
    Keyword(usize),
}

/// Call arguments matched to a method's parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgBinding {
    params: &'static [&'static str],
    slots: Vec<Option<ArgSlot>>,
}

impl ArgBinding {
    pub fn get(&self, param: &str) -> Option<ArgSlot> {
        self.params
            .iter()
            .position(|p| *p == param)
            .and_then(|i| self.slots[i])
    }
}

impl MemberSignature {
    pub fn method(kind: Kind, name: &'static str, params: &'static [&'static str], required: usize) -> Self {
        Self {
            kind,
            name,
            member: Member::Method { params, required },
        }
    }

    pub fn attribute(kind: Kind, name: &'static str) -> Self {
        Self {
            kind,
            name,
            member: Member::Attribute,
        }
    }

    /// Match `positional` leading arguments and the named keywords to parameters
    pub fn bind(&self, positional: usize, keywords: &[&str]) -> Result<ArgBinding, RegistryError> {
        let (params, required) = match &self.member {
            Member::Method { params, required } => (*params, *required),
            Member::Attribute => {
                return Err(RegistryError::NotCallable {
                    kind: self.kind,
                    name: self.name.to_string(),
                })
            }
        };

        if positional > params.len() {
            return Err(RegistryError::TooManyArguments {
                name: self.name.to_string(),
                max: params.len(),
                given: positional,
            });
        }

        let mut slots: Vec<Option<ArgSlot>> = (0..params.len())
            .map(|i| (i < positional).then_some(ArgSlot::Positional(i)))
            .collect();

        for (k, keyword) in keywords.iter().enumerate() {
            let index = params
                .iter()
                .position(|p| p == keyword)
                .ok_or_else(|| RegistryError::UnexpectedKeyword {
                    name: self.name.to_string(),
                    keyword: keyword.to_string(),
                })?;
            if slots[index].is_some() {
                return Err(RegistryError::DuplicateArgument {
                    name: self.name.to_string(),
                    param: keyword.to_string(),
                });
            }
            slots[index] = Some(ArgSlot::Keyword(k));
        }

        if let Some(missing) = (0..required).find(|&i| slots[i].is_none()) {
            return Err(RegistryError::MissingArgument {
                name: self.name.to_string(),
                param: params[missing].to_string(),
            });
        }

        Ok(ArgBinding { params, slots })
    }
}

const NO_PARAMS: &[&str] = &[];
const HEAD_PARAMS: &[&str] = &["n"];

const SERIES_REDUCTIONS: &[&str] = &["sum", "mean", "median", "min", "max", "count", "nunique"];
const GROUPED_LABEL_REDUCTIONS: &[&str] = &["idxmax", "idxmin"];
const DATE_PARTS: &[&str] = &["year", "month", "day", "hour", "minute", "dayofweek", "weekday"];

/// Registry of reachable names and members
pub struct SandboxRegistry {
    bindings: HashMap<&'static str, Binding>,
    members: HashMap<Kind, HashMap<&'static str, Vec<MemberSignature>>>,
}

impl SandboxRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            bindings: HashMap::new(),
            members: HashMap::new(),
        };
        registry.register_builtins();
        registry
    }

    fn register_builtins(&mut self) {
        self.bindings.insert(DATASET_IDENT, Binding::Dataset);
        self.bindings.insert(PANDAS_IDENT, Binding::Pandas);
        self.bindings.insert(LEN_IDENT, Binding::Len);

        self.register(MemberSignature::method(Kind::Builtins, LEN_IDENT, &["obj"], 1));

        // pd namespace
        self.register(MemberSignature::attribute(Kind::Pandas, "Timestamp"));
        self.register(MemberSignature::method(Kind::Pandas, "Timestamp", &["ts_input"], 1));
        self.register(MemberSignature::method(Kind::Pandas, "to_datetime", &["arg"], 1));
        self.register(MemberSignature::method(
            Kind::Pandas,
            "Timedelta",
            &["value", "days", "hours", "minutes", "seconds", "weeks"],
            0,
        ));
        self.register(MemberSignature::method(Kind::TimestampClass, "now", NO_PARAMS, 0));
        self.register(MemberSignature::method(Kind::TimestampClass, "today", NO_PARAMS, 0));

        // DataFrame
        self.register(MemberSignature::method(Kind::Frame, "head", HEAD_PARAMS, 0));
        self.register(MemberSignature::method(Kind::Frame, "tail", HEAD_PARAMS, 0));
        self.register(MemberSignature::method(Kind::Frame, "groupby", &["by"], 1));
        self.register(MemberSignature::method(Kind::Frame, "sort_values", &["by", "ascending"], 1));
        self.register(MemberSignature::attribute(Kind::Frame, "shape"));

        // Series
        self.register(MemberSignature::method(Kind::Series, "head", HEAD_PARAMS, 0));
        self.register(MemberSignature::method(Kind::Series, "tail", HEAD_PARAMS, 0));
        self.register(MemberSignature::method(Kind::Series, "value_counts", &["normalize"], 0));
        self.register(MemberSignature::method(Kind::Series, "unique", NO_PARAMS, 0));
        for name in SERIES_REDUCTIONS {
            self.register(MemberSignature::method(Kind::Series, *name, NO_PARAMS, 0));
        }
        self.register(MemberSignature::method(Kind::Series, "isin", &["values"], 1));
        for name in ["isna", "isnull", "notna", "notnull"] {
            self.register(MemberSignature::method(Kind::Series, name, NO_PARAMS, 0));
        }
        self.register(MemberSignature::method(Kind::Series, "between", &["left", "right"], 2));
        self.register(MemberSignature::method(Kind::Series, "sort_values", &["ascending"], 0));
        self.register(MemberSignature::attribute(Kind::Series, "dt"));
        self.register(MemberSignature::attribute(Kind::Series, "str"));

        // .dt accessor
        self.register(MemberSignature::attribute(Kind::DtAccessor, "date"));
        for name in DATE_PARTS {
            self.register(MemberSignature::attribute(Kind::DtAccessor, *name));
        }

        // .str accessor
        self.register(MemberSignature::method(
            Kind::StrAccessor,
            "contains",
            &["pat", "case", "na", "regex"],
            1,
        ));
        self.register(MemberSignature::method(Kind::StrAccessor, "startswith", &["pat"], 1));
        self.register(MemberSignature::method(Kind::StrAccessor, "endswith", &["pat"], 1));
        self.register(MemberSignature::method(Kind::StrAccessor, "lower", NO_PARAMS, 0));
        self.register(MemberSignature::method(Kind::StrAccessor, "upper", NO_PARAMS, 0));

        // groupby
        self.register(MemberSignature::method(Kind::GroupBy, "size", NO_PARAMS, 0));
        self.register(MemberSignature::method(Kind::GroupByColumn, "size", NO_PARAMS, 0));
        for name in SERIES_REDUCTIONS {
            self.register(MemberSignature::method(Kind::GroupByColumn, *name, NO_PARAMS, 0));
        }

        // Series indexed by group labels
        self.register(MemberSignature::method(Kind::Grouped, "head", HEAD_PARAMS, 0));
        self.register(MemberSignature::method(Kind::Grouped, "tail", HEAD_PARAMS, 0));
        self.register(MemberSignature::method(Kind::Grouped, "sort_values", &["ascending"], 0));
        for name in SERIES_REDUCTIONS.iter().chain(GROUPED_LABEL_REDUCTIONS) {
            self.register(MemberSignature::method(Kind::Grouped, *name, NO_PARAMS, 0));
        }

        // Timestamp and other scalars
        self.register(MemberSignature::method(Kind::Scalar, "date", NO_PARAMS, 0));
        self.register(MemberSignature::method(Kind::Scalar, "normalize", NO_PARAMS, 0));
        for name in DATE_PARTS {
            self.register(MemberSignature::attribute(Kind::Scalar, *name));
        }
    }

    pub fn register(&mut self, sig: MemberSignature) {
        self.members
            .entry(sig.kind)
            .or_default()
            .entry(sig.name)
            .or_default()
            .push(sig);
    }

    /// Resolve a bare identifier
    pub fn resolve(&self, name: &str) -> Result<Binding, RegistryError> {
        if name.starts_with('_') {
            return Err(RegistryError::PrivateMember(name.to_string()));
        }
        self.bindings
            .get(name)
            .copied()
            .ok_or_else(|| RegistryError::UnknownName(name.to_string()))
    }

    /// Look up a member being called
    pub fn method(&self, kind: Kind, name: &str) -> Result<&MemberSignature, RegistryError> {
        let overloads = self.overloads(kind, name)?;
        overloads
            .iter()
            .find(|sig| matches!(sig.member, Member::Method { .. }))
            .ok_or_else(|| RegistryError::NotCallable {
                kind,
                name: name.to_string(),
            })
    }

    /// Look up a member being read without a call
    pub fn attribute(&self, kind: Kind, name: &str) -> Result<&MemberSignature, RegistryError> {
        let overloads = self.overloads(kind, name)?;
        overloads
            .iter()
            .find(|sig| sig.member == Member::Attribute)
            .ok_or_else(|| RegistryError::MethodReference {
                kind,
                name: name.to_string(),
            })
    }

    fn overloads(&self, kind: Kind, name: &str) -> Result<&[MemberSignature], RegistryError> {
        if name.starts_with('_') {
            return Err(RegistryError::PrivateMember(name.to_string()));
        }
        self.members
            .get(&kind)
            .and_then(|members| members.get(name))
            .map(Vec::as_slice)
            .ok_or_else(|| RegistryError::UnknownMember {
                kind,
                name: name.to_string(),
            })
    }
}

impl Default for SandboxRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_bindings() {
        let registry = SandboxRegistry::new();
        assert_eq!(registry.resolve("df_combined"), Ok(Binding::Dataset));
        assert_eq!(registry.resolve("pd"), Ok(Binding::Pandas));
        assert_eq!(registry.resolve("len"), Ok(Binding::Len));
        assert_eq!(
            registry.resolve("os"),
            Err(RegistryError::UnknownName("os".to_string()))
        );
        assert_eq!(
            registry.resolve("__import__"),
            Err(RegistryError::PrivateMember("__import__".to_string()))
        );
    }

    #[test]
    fn test_private_members_rejected() {
        let registry = SandboxRegistry::new();
        let err = registry.attribute(Kind::Frame, "__class__").unwrap_err();
        assert_eq!(err, RegistryError::PrivateMember("__class__".to_string()));
    }

    #[test]
    fn test_unknown_member() {
        let registry = SandboxRegistry::new();
        let err = registry.method(Kind::Frame, "to_csv").unwrap_err();
        assert!(matches!(err, RegistryError::UnknownMember { kind: Kind::Frame, .. }));
        assert_eq!(err.to_string(), "'DataFrame' object has no attribute 'to_csv'");
    }

    #[test]
    fn test_timestamp_is_attribute_and_method() {
        let registry = SandboxRegistry::new();
        assert!(registry.attribute(Kind::Pandas, "Timestamp").is_ok());
        assert!(registry.method(Kind::Pandas, "Timestamp").is_ok());
        assert!(matches!(
            registry.attribute(Kind::Pandas, "to_datetime"),
            Err(RegistryError::MethodReference { .. })
        ));
        assert!(matches!(
            registry.method(Kind::Series, "dt"),
            Err(RegistryError::NotCallable { .. })
        ));
    }

    #[test]
    fn test_grouped_reductions_registered() {
        let registry = SandboxRegistry::new();
        for name in ["max", "min", "sum", "idxmax", "idxmin"] {
            assert!(registry.method(Kind::Grouped, name).is_ok(), "{name}");
        }
        assert!(registry.method(Kind::Grouped, "apply").is_err());
    }

    #[test]
    fn test_bind_positional_and_keyword() {
        let registry = SandboxRegistry::new();
        let sig = registry.method(Kind::StrAccessor, "contains").unwrap();

        let binding = sig.bind(1, &["case", "na"]).unwrap();
        assert_eq!(binding.get("pat"), Some(ArgSlot::Positional(0)));
        assert_eq!(binding.get("case"), Some(ArgSlot::Keyword(0)));
        assert_eq!(binding.get("na"), Some(ArgSlot::Keyword(1)));
        assert_eq!(binding.get("regex"), None);
    }

    #[test]
    fn test_bind_errors() {
        let registry = SandboxRegistry::new();
        let head = registry.method(Kind::Frame, "head").unwrap();
        assert!(matches!(
            head.bind(2, &[]),
            Err(RegistryError::TooManyArguments { max: 1, given: 2, .. })
        ));
        assert!(matches!(
            head.bind(1, &["n"]),
            Err(RegistryError::DuplicateArgument { .. })
        ));
        assert!(matches!(
            head.bind(0, &["rows"]),
            Err(RegistryError::UnexpectedKeyword { .. })
        ));

        let between = registry.method(Kind::Series, "between").unwrap();
        let err = between.bind(1, &[]).unwrap_err();
        assert_eq!(err.to_string(), "between() missing required argument: 'right'");
    }
}
