//! Insertion-ordered, uniquely named entries.
//!
//! Option order in the viewer follows insertion order, so collections are
//! plain lists rather than maps.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("duplicate entry name '{0}'")]
pub struct DuplicateName(pub String);

#[derive(Clone, Debug, PartialEq)]
pub struct NamedCollection<T> {
    entries: Vec<(String, T)>,
}

impl<T> Default for NamedCollection<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> NamedCollection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry. Names must be unique.
    pub fn push(&mut self, name: impl Into<String>, item: T) -> Result<(), DuplicateName> {
        let name = name.into();
        if self.position(&name).is_some() {
            return Err(DuplicateName(name));
        }
        self.entries.push((name, item));
        Ok(())
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(n, _)| n == name)
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.position(name).map(|i| &self.entries[i].1)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(n, item)| (n.as_str(), item))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Applies `f` to every item, keeping names and order.
    pub fn map<U>(self, mut f: impl FnMut(&str, T) -> U) -> NamedCollection<U> {
        NamedCollection {
            entries: self
                .entries
                .into_iter()
                .map(|(name, item)| {
                    let mapped = f(&name, item);
                    (name, mapped)
                })
                .collect(),
        }
    }
}

impl<T> TryFrom<Vec<(String, T)>> for NamedCollection<T> {
    type Error = DuplicateName;

    fn try_from(entries: Vec<(String, T)>) -> Result<Self, Self::Error> {
        let mut collection = Self::new();
        for (name, item) in entries {
            collection.push(name, item)?;
        }
        Ok(collection)
    }
}

impl<T> IntoIterator for NamedCollection<T> {
    type Item = (String, T);
    type IntoIter = std::vec::IntoIter<(String, T)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
