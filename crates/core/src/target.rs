use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlKind {
    AnonymousBlock,
    Procedure,
    Function,
    Trigger,
    PackageHead,
    PackageBody,
    Type,
}

impl PlKind {
    #[must_use]
    pub fn is_package(self) -> bool {
        matches!(self, Self::PackageHead | Self::PackageBody)
    }

    #[must_use]
    pub fn is_subprogram(self) -> bool {
        matches!(self, Self::Procedure | Self::Function)
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::AnonymousBlock => "anonymous block",
            Self::Procedure => "procedure",
            Self::Function => "function",
            Self::Trigger => "trigger",
            Self::PackageHead => "package",
            Self::PackageBody => "package body",
            Self::Type => "type",
        }
    }
}

impl fmt::Display for PlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlSchema {
    pub kind: PlKind,
    pub name: Option<String>,
    pub package_name: Option<String>,
    pub ddl: String,
}

impl PlSchema {
    #[must_use]
    pub fn anonymous(ddl: impl Into<String>) -> Self {
        Self {
            kind: PlKind::AnonymousBlock,
            name: None,
            package_name: None,
            ddl: ddl.into(),
        }
    }

    #[must_use]
    pub fn named(kind: PlKind, name: impl Into<String>, ddl: impl Into<String>) -> Self {
        Self {
            kind,
            name: Some(name.into()),
            package_name: None,
            ddl: ddl.into(),
        }
    }

    #[must_use]
    pub fn with_package(mut self, package_name: impl Into<String>) -> Self {
        self.package_name = Some(package_name.into());
        self
    }

    #[must_use]
    pub fn target(&self) -> PlTarget {
        PlTarget {
            kind: self.kind,
            name: self.name.clone(),
            package_name: self.package_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlTarget {
    pub kind: PlKind,
    pub name: Option<String>,
    pub package_name: Option<String>,
}

impl fmt::Display for PlTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.package_name, &self.name) {
            (Some(package), Some(name)) => write!(f, "{} {package}.{name}", self.kind),
            (None, Some(name)) => write!(f, "{} {name}", self.kind),
            (_, None) => write!(f, "{}", self.kind),
        }
    }
}
