//! Call-site identity: interning annotated program locations into dense ids.

use std::num::NonZero;
use std::sync::atomic::{AtomicU32, Ordering};

use foldhash::{HashMap, HashMapExt};
use parking_lot::Mutex;

/// Identifies one annotated program location.
///
/// Ids are dense, assigned in registration order, and stable for the lifetime
/// of the process. Call-sites are never unregistered; draining the recorded
/// events does not invalidate ids.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CallSiteId(u32);

impl CallSiteId {
    pub(crate) fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("more than u32::MAX distinct call-sites is unrealistic"))
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn as_u32(self) -> u32 {
        self.0
    }

    pub(crate) fn from_u32(raw: u32) -> Self {
        Self(raw)
    }
}

/// An annotated program location: source file, function, line, and the
/// optional name given at the annotation point.
///
/// Two markers at the same source coordinates share one call-site. A marker
/// with an explicit name is a distinct call-site: the name replaces the
/// function part of the identity, so two differently-named markers on the
/// same line produce two rows in the results.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct CallSite {
    file: String,
    function: String,
    line: NonZero<u32>,
    name_override: Option<String>,
}

impl CallSite {
    pub(crate) fn new(
        file: impl Into<String>,
        function: impl Into<String>,
        line: NonZero<u32>,
        name_override: Option<String>,
    ) -> Self {
        Self {
            file: file.into(),
            function: function.into(),
            line,
            name_override,
        }
    }

    /// The source file the marker appears in.
    #[must_use]
    pub fn file(&self) -> &str {
        &self.file
    }

    /// The name of the function containing the marker.
    #[must_use]
    pub fn function(&self) -> &str {
        &self.function
    }

    /// The 1-based source line of the marker.
    #[must_use]
    pub fn line(&self) -> NonZero<u32> {
        self.line
    }

    /// The explicit name given at the annotation point, if any.
    #[must_use]
    pub fn name_override(&self) -> Option<&str> {
        self.name_override.as_deref()
    }

    /// The name this call-site is reported under: the override name if one
    /// was given, the containing function otherwise.
    #[must_use]
    pub fn label(&self) -> &str {
        self.name_override.as_deref().unwrap_or(&self.function)
    }
}

/// Process-wide directory from (file, label, line) to [`CallSiteId`].
#[derive(Debug)]
pub(crate) struct CallSiteTable {
    inner: Mutex<TableInner>,
}

#[derive(Debug)]
struct TableInner {
    by_key: HashMap<(String, String, u32), CallSiteId>,
    sites: Vec<CallSite>,
}

impl CallSiteTable {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(TableInner {
                by_key: HashMap::new(),
                sites: Vec::new(),
            }),
        }
    }

    /// Registers a call-site, returning the existing id if the same
    /// (file, label, line) triple was seen before.
    pub(crate) fn intern(
        &self,
        file: &str,
        function: &str,
        line: NonZero<u32>,
        name_override: Option<&str>,
    ) -> CallSiteId {
        let label = name_override.unwrap_or(function);
        let mut inner = self.inner.lock();

        if let Some(id) = inner
            .by_key
            .get(&(file.to_string(), label.to_string(), line.get()))
        {
            return *id;
        }

        let id = CallSiteId::new(inner.sites.len());
        inner.sites.push(CallSite::new(
            file,
            function,
            line,
            name_override.map(str::to_string),
        ));
        inner
            .by_key
            .insert((file.to_string(), label.to_string(), line.get()), id);
        id
    }

    /// A point-in-time copy of every registered call-site, indexed by id.
    pub(crate) fn snapshot(&self) -> Vec<CallSite> {
        self.inner.lock().sites.clone()
    }
}

/// Per-marker registration slot embedded by the recording macros.
///
/// Each marker expansion owns one static slot; the slot caches the interned
/// [`CallSiteId`] in an atomic so the steady-state cost of resolving the
/// call-site is a single atomic load. The function name is only computed on
/// the first registration.
#[derive(Debug)]
pub struct SiteSlot {
    file: &'static str,
    line: u32,
    name_override: Option<&'static str>,
    // 0 = unregistered, otherwise id + 1.
    cached: AtomicU32,
}

impl SiteSlot {
    /// Creates an unregistered slot. Called from macro expansions only.
    #[must_use]
    pub const fn new(file: &'static str, line: u32, name_override: Option<&'static str>) -> Self {
        Self {
            file,
            line,
            name_override,
            cached: AtomicU32::new(0),
        }
    }

    /// Resolves the call-site id, registering on first use.
    ///
    /// `function` is invoked only on the registration path.
    pub(crate) fn resolve(&self, function: impl FnOnce() -> &'static str) -> CallSiteId {
        // Relaxed suffices: the id is only interpreted through the table,
        // and every table read happens under the table lock.
        match self.cached.load(Ordering::Relaxed) {
            0 => self.register(function()),
            cached => CallSiteId::from_u32(cached.wrapping_sub(1)),
        }
    }

    #[cold]
    fn register(&self, function: &'static str) -> CallSiteId {
        let line = NonZero::new(self.line).expect("source line numbers are 1-based");

        let id = crate::registry::global().intern_site(
            self.file,
            trim_function_path(function),
            line,
            self.name_override,
        );

        self.cached
            .store(id.as_u32().wrapping_add(1), Ordering::Relaxed);
        id
    }
}

/// Strips the trailing machinery segments from a `type_name`-derived function
/// path, leaving the path as a human would write it.
pub(crate) fn trim_function_path(raw: &'static str) -> &'static str {
    let mut name = raw.strip_suffix("::f").unwrap_or(raw);
    while let Some(stripped) = name.strip_suffix("::{{closure}}") {
        name = stripped;
    }
    name
}
