//! Platform objects and the narrow services they depend on.

pub mod branch;
pub mod devops;
pub mod measures;
pub mod permission_template;
pub mod permissions;
pub mod portfolio;
pub mod project;
pub mod quality;
pub mod settings;
pub mod task;
pub mod webhook;

use std::sync::Arc;

pub use portfolio::Portfolio;
pub use project::Project;

/// A project given either by key or as an already loaded object.
#[derive(Debug, Clone, Copy)]
pub enum KeyRef<'a> {
    Key(&'a str),
    Project(&'a Project),
}

impl KeyRef<'_> {
    pub fn key(&self) -> &str {
        match self {
            KeyRef::Key(key) => key,
            KeyRef::Project(project) => project.key(),
        }
    }
}

impl<'a> From<&'a str> for KeyRef<'a> {
    fn from(key: &'a str) -> Self {
        KeyRef::Key(key)
    }
}

impl<'a> From<&'a String> for KeyRef<'a> {
    fn from(key: &'a String) -> Self {
        KeyRef::Key(key)
    }
}

impl<'a> From<&'a Project> for KeyRef<'a> {
    fn from(project: &'a Project) -> Self {
        KeyRef::Project(project)
    }
}

impl<'a> From<&'a Arc<Project>> for KeyRef<'a> {
    fn from(project: &'a Arc<Project>) -> Self {
        KeyRef::Project(project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ref_resolves_to_key() {
        let key = String::from("my-project");
        assert_eq!(KeyRef::from(key.as_str()).key(), "my-project");
        assert_eq!(KeyRef::from(&key).key(), "my-project");
    }
}
