//! Registering Rust enums as default choice groups.

use dbchoice_core::{ChoiceScalar, RawChoice};

/// One member of a [`ChoiceEnum`].
#[derive(Debug, Clone, PartialEq)]
pub struct EnumMemberSpec {
    pub name: &'static str,
    pub value: ChoiceScalar,
    /// Falls back to `name` when absent.
    pub label: Option<String>,
}

impl EnumMemberSpec {
    pub fn new(name: &'static str, value: impl Into<ChoiceScalar>, label: Option<&str>) -> Self {
        Self {
            name,
            value: value.into(),
            label: label.map(str::to_string),
        }
    }

    pub(crate) fn into_raw(self) -> RawChoice {
        let label = self.label.unwrap_or_else(|| self.name.to_string());
        RawChoice(vec![
            ChoiceScalar::Text(self.name.to_string()),
            self.value,
            ChoiceScalar::Text(label),
        ])
    }
}

/// A Rust enum whose members can be registered as a choice group.
///
/// Usually implemented through [`choice_enum!`](crate::choice_enum).
pub trait ChoiceEnum {
    /// Group name used when registration does not name one.
    fn type_name() -> &'static str;

    fn members() -> Vec<EnumMemberSpec>;
}

/// Declare an enum together with its [`ChoiceEnum`] implementation.
///
/// ```
/// dbchoice_registry::choice_enum! {
///     pub enum TicketStatus {
///         Open = "open" => "Open",
///         Closed = "closed" => "Closed",
///         Archived = "archived",
///     }
/// }
///
/// use dbchoice_registry::ChoiceEnum;
/// assert_eq!(TicketStatus::type_name(), "TicketStatus");
/// assert_eq!(TicketStatus::members().len(), 3);
/// assert_eq!(TicketStatus::Closed.name(), "Closed");
/// ```
#[macro_export]
macro_rules! choice_enum {
    (@label) => {
        ::std::option::Option::None
    };
    (@label $label:literal) => {
        ::std::option::Option::Some($label)
    };
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $variant:ident = $value:literal $(=> $label:literal)? ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $( $variant ),+
        }

        impl $name {
            /// Member name as registered.
            pub fn name(self) -> &'static str {
                match self {
                    $( $name::$variant => stringify!($variant) ),+
                }
            }
        }

        impl $crate::ChoiceEnum for $name {
            fn type_name() -> &'static str {
                stringify!($name)
            }

            fn members() -> ::std::vec::Vec<$crate::EnumMemberSpec> {
                ::std::vec![
                    $(
                        $crate::EnumMemberSpec::new(
                            stringify!($variant),
                            $value,
                            $crate::choice_enum!(@label $($label)?),
                        )
                    ),+
                ]
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::choice_enum! {
        enum Priority {
            High = 1 => "High priority",
            Low = 2,
        }
    }

    #[test]
    fn test_members_from_macro() {
        let members = Priority::members();
        assert_eq!(Priority::type_name(), "Priority");
        assert_eq!(members[0], EnumMemberSpec::new("High", 1i64, Some("High priority")));
        assert_eq!(members[1].label, None);
        assert_eq!(Priority::Low.name(), "Low");
    }

    #[test]
    fn test_label_falls_back_to_name() {
        let raw = EnumMemberSpec::new("OPEN", "open", None).into_raw();
        assert_eq!(
            raw.0,
            vec![
                ChoiceScalar::Text("OPEN".to_string()),
                ChoiceScalar::Text("open".to_string()),
                ChoiceScalar::Text("OPEN".to_string()),
            ]
        );
    }
}
