//! The recording primitive: a guard that logs a begin event when created and
//! an end event when dropped.

use negative_impl::negative_impl;

use crate::clock::Clock;
use crate::event::Event;
use crate::registry;
use crate::site::{CallSiteId, SiteSlot};

/// Marks a timed region of code.
///
/// Entering records a begin event on the calling thread's buffer; dropping
/// records the matching end event. Rust's drop rules guarantee the end event
/// on every exit path out of the enclosing scope, including early returns,
/// `?` propagation and unwinding.
///
/// A scope must begin and end on the same thread, so the type is neither
/// `Send` nor `Sync`. Use the [`track!`](crate::track),
/// [`track_dev!`](crate::track_dev) and [`track_prod!`](crate::track_prod)
/// macros rather than constructing scopes by hand; the macros embed the
/// call-site registration slot and compile to nothing when their group is
/// disabled.
///
/// # Examples
///
/// ```
/// fn process_batch(items: &[u32]) -> u64 {
///     call_tracker::track!();
///
///     items.iter().map(|item| u64::from(item * 2)).sum()
/// }
///
/// process_batch(&[1, 2, 3]);
/// let report = call_tracker::drain();
/// assert_eq!(report.summary_rows().len(), 1);
/// ```
#[derive(Debug)]
#[must_use = "dropping the scope immediately records a zero-length region"]
pub struct Scope {
    site: CallSiteId,
}

impl Scope {
    /// Begins a scope for the call-site described by `slot`.
    ///
    /// `function` supplies the containing function's name; it is only invoked
    /// the first time this slot registers. Steady-state cost is one clock
    /// reading, one atomic load and one buffer append.
    pub fn enter(slot: &'static SiteSlot, function: impl FnOnce() -> &'static str) -> Self {
        let timestamp = Clock::now();
        let site = slot.resolve(function);
        registry::record(Event::begin(site, timestamp));

        Self { site }
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        registry::record(Event::end(self.site, Clock::now()));
    }
}

#[negative_impl]
impl !Send for Scope {}
#[negative_impl]
impl !Sync for Scope {}

/// Resolves to the path of the containing function as a `&'static str`.
///
/// Implementation detail of the tracking macros; the cost is only paid on a
/// call-site's first registration.
#[doc(hidden)]
#[macro_export]
macro_rules! __function_name {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        type_name_of(f)
    }};
}

/// Times the enclosing scope under the production marker group.
///
/// With no arguments the call-site is identified by source location and the
/// containing function's name; an explicit name (a `&'static str`) replaces
/// the function-name part of the identity, producing a separate row in the
/// results.
///
/// Compiles to nothing unless the `track-prod` feature (default on) is
/// enabled.
///
/// # Examples
///
/// ```
/// fn checkout() {
///     call_tracker::track_prod!();
///     // ... the body being timed ...
/// }
///
/// fn stages() {
///     {
///         call_tracker::track_prod!("validate");
///         // ... first stage ...
///     }
///     {
///         call_tracker::track_prod!("commit");
///         // ... second stage ...
///     }
/// }
/// ```
#[cfg(feature = "track-prod")]
#[macro_export]
macro_rules! track_prod {
    () => {
        let _call_tracker_scope = {
            static SITE: $crate::SiteSlot = $crate::SiteSlot::new(file!(), line!(), None);
            $crate::Scope::enter(&SITE, || $crate::__function_name!())
        };
    };
    ($name:expr) => {
        let _call_tracker_scope = {
            static SITE: $crate::SiteSlot = $crate::SiteSlot::new(file!(), line!(), Some($name));
            $crate::Scope::enter(&SITE, || $crate::__function_name!())
        };
    };
}

/// Disabled rendition of [`track_prod!`]: expands to no code at all.
#[cfg(not(feature = "track-prod"))]
#[macro_export]
macro_rules! track_prod {
    () => {};
    ($name:expr) => {};
}

/// Times the enclosing scope under the development marker group.
///
/// Identical to [`track_prod!`] except for its enablement switch: compiles to
/// nothing unless the `track-dev` feature (default on) is enabled, so
/// development-only markers can be stripped from release builds while the
/// production group keeps recording.
#[cfg(feature = "track-dev")]
#[macro_export]
macro_rules! track_dev {
    () => {
        let _call_tracker_scope = {
            static SITE: $crate::SiteSlot = $crate::SiteSlot::new(file!(), line!(), None);
            $crate::Scope::enter(&SITE, || $crate::__function_name!())
        };
    };
    ($name:expr) => {
        let _call_tracker_scope = {
            static SITE: $crate::SiteSlot = $crate::SiteSlot::new(file!(), line!(), Some($name));
            $crate::Scope::enter(&SITE, || $crate::__function_name!())
        };
    };
}

/// Disabled rendition of [`track_dev!`]: expands to no code at all.
#[cfg(not(feature = "track-dev"))]
#[macro_export]
macro_rules! track_dev {
    () => {};
    ($name:expr) => {};
}

/// Times the enclosing scope under the default marker group.
///
/// The default group is an alias of the production group, so this follows
/// the `track-prod` feature.
///
/// # Examples
///
/// ```
/// fn handle_request() {
///     call_tracker::track!();
///     // ... the body being timed ...
/// }
/// ```
#[cfg(feature = "track-prod")]
#[macro_export]
macro_rules! track {
    () => {
        $crate::track_prod!();
    };
    ($name:expr) => {
        $crate::track_prod!($name);
    };
}

/// Disabled rendition of [`track!`]: expands to no code at all.
#[cfg(not(feature = "track-prod"))]
#[macro_export]
macro_rules! track {
    () => {};
    ($name:expr) => {};
}
