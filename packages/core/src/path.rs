//! Slash-separated paths for both the mounted namespace and the secret tree.

use std::fmt;

/// Errors related to path parsing and validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// A path component cannot be used as a file name.
    #[error("invalid path component '{component}' at position {position}: {message}")]
    InvalidComponent {
        component: String,
        position: usize,
        message: String,
    },
}

/// A validated, relative path.
///
/// The empty path denotes the root of whatever tree it is resolved against:
/// the filesystem root for the dispatcher, the namespace root for a FIO, and
/// the top of the secret tree for a store.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Path {
    pub components: Vec<String>,
}

impl Path {
    /// The empty path.
    pub fn root() -> Self {
        Path::default()
    }

    /// Parse a path string, validating components.
    ///
    /// # Path Syntax
    ///
    /// - Components are separated by `/`
    /// - Empty components are ignored (normalizes `//`, leading and trailing `/`)
    /// - `.` and `..` are rejected, as is any component containing NUL
    ///
    /// # Examples
    ///
    /// ```rust
    /// use secretsfs_core::Path;
    ///
    /// let path = Path::parse("db/password").unwrap();
    /// assert_eq!(path.len(), 2);
    ///
    /// assert_eq!(Path::parse("/db/").unwrap(), Path::parse("db").unwrap());
    /// assert!(Path::parse("").unwrap().is_empty());
    /// ```
    pub fn parse(s: &str) -> Result<Self, PathError> {
        let components: Vec<String> = s
            .split('/')
            .filter(|c| !c.is_empty())
            .map(|c| c.to_string())
            .collect();

        for (i, component) in components.iter().enumerate() {
            Self::validate_component(component, i)?;
        }

        Ok(Path { components })
    }

    fn validate_component(component: &str, position: usize) -> Result<(), PathError> {
        let message = if component.is_empty() {
            "empty component"
        } else if component == "." || component == ".." {
            "relative components are not allowed"
        } else if component.contains('\0') {
            "NUL byte in component"
        } else if component.contains('/') {
            "separator in component"
        } else {
            return Ok(());
        };

        Err(PathError::InvalidComponent {
            component: component.to_string(),
            position,
            message: message.to_string(),
        })
    }

    /// Check if this path is empty (root path).
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Get the number of components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Iterate over components.
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.components.iter()
    }

    /// Split off the first component.
    ///
    /// Returns `None` for the empty path. The remainder may be empty.
    pub fn split_first(&self) -> Option<(&str, Path)> {
        let (first, rest) = self.components.split_first()?;
        Some((
            first.as_str(),
            Path {
                components: rest.to_vec(),
            },
        ))
    }

    /// Split off the last component.
    pub fn split_last(&self) -> Option<(Path, &str)> {
        let (last, parent) = self.components.split_last()?;
        Some((
            Path {
                components: parent.to_vec(),
            },
            last.as_str(),
        ))
    }

    /// Append a single component.
    pub fn child(&self, name: &str) -> Result<Path, PathError> {
        Self::validate_component(name, self.components.len())?;
        let mut components = self.components.clone();
        components.push(name.to_string());
        Ok(Path { components })
    }

    /// Check if this path has the given prefix.
    pub fn has_prefix(&self, prefix: &Path) -> bool {
        prefix.components.len() <= self.components.len()
            && prefix.components == self.components[..prefix.components.len()]
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.components.join("/"))
    }
}

impl std::ops::Index<usize> for Path {
    type Output = String;

    fn index(&self, i: usize) -> &Self::Output {
        &self.components[i]
    }
}

/// Macro for creating paths from literals.
///
/// # Example
///
/// ```rust
/// use secretsfs_core::path;
///
/// let p = path!("secrets/db/password");
/// assert_eq!(p.len(), 3);
/// ```
#[macro_export]
macro_rules! path {
    ($s:expr) => {
        $crate::Path::parse($s).expect("invalid path literal")
    };
}
