#![forbid(unsafe_code)]

//! Shallow partial-update merging.
//!
//! A *patch* mirrors its target struct with every field wrapped in
//! `Option`. Merging copies each populated field onto the target,
//! overwriting whatever was there, and leaves the rest untouched. There is
//! no deep merge, no sequence concatenation, and no coercion: a patched
//! field replaces the old value wholesale.
//!
//! Shapes opt in through [`patchable!`], which expands to the struct, its
//! patch struct, and the [`Merge`] impl as explicit per-field conditional
//! assignments — merge semantics are generated per concrete shape rather
//! than discovered at runtime.

/// Shallow merge of a generated patch into `self`.
pub trait Merge {
    /// The all-`Option` mirror of `Self`, normally produced by
    /// [`patchable!`].
    type Patch;

    /// Copy every populated patch field onto `self`.
    fn merge(&mut self, patch: Self::Patch);
}

/// Define a struct together with its patch type and [`Merge`] impl.
///
/// The patch struct derives `Default` (all fields start absent) and gets a
/// `#[must_use]` builder-style setter per field. Attributes written on the
/// struct and its fields are passed through verbatim.
///
/// ```
/// triptych_core::patchable! {
///     /// Presentation settings.
///     #[derive(Debug, Default, Clone, PartialEq)]
///     pub struct Settings => SettingsPatch {
///         pub theme: String,
///         pub font_size: u16,
///     }
/// }
///
/// use triptych_core::Merge;
///
/// let mut settings = Settings { theme: "light".into(), font_size: 12 };
/// settings.merge(SettingsPatch::default().theme("dark".into()));
/// assert_eq!(settings.theme, "dark");
/// assert_eq!(settings.font_size, 12);
/// ```
#[macro_export]
macro_rules! patchable {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident => $patch:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident : $field_ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$field_meta])*
                $field_vis $field: $field_ty,
            )*
        }

        #[doc = concat!(
            "Shallow patch for [`", stringify!($name), "`]. ",
            "Fields left as `None` are untouched by the merge.",
        )]
        #[derive(Default)]
        $vis struct $patch {
            $(
                $field_vis $field: ::core::option::Option<$field_ty>,
            )*
        }

        impl $patch {
            $(
                #[doc = concat!("Populate `", stringify!($field), "`.")]
                #[must_use]
                $field_vis fn $field(mut self, value: $field_ty) -> Self {
                    self.$field = ::core::option::Option::Some(value);
                    self
                }
            )*
        }

        impl $crate::merge::Merge for $name {
            type Patch = $patch;

            fn merge(&mut self, patch: $patch) {
                $(
                    if let ::core::option::Option::Some(value) = patch.$field {
                        self.$field = value;
                    }
                )*
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
