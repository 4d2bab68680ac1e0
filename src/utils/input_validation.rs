//! Validation des champs saisis par l'utilisateur.
//!
//! Chaque prédicat est une fonction pure qui renvoie toujours un booléen.
//! Les bornes de longueur sont passées explicitement au validateur.

use derive_more::derive::Display;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ValidationBounds;

// local@domain.tld where no part holds a blank or an @.
// Further dots are allowed in either part.
static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s\x{FEFF}@]+@[^\s\x{FEFF}@]+\.[^\s\x{FEFF}@]+$")
        .expect("Failed to compile email regex")
});

/// Retire les blancs en début et fin de saisie.
///
/// U+FEFF (byte order mark) counts as a blank, as it does for form input
/// in a browser; `str::trim` alone leaves it in place.
pub fn trim_blank(value: &str) -> &str {
    value.trim_matches(|c: char| c.is_whitespace() || c == '\u{FEFF}')
}

/// Forme utilisée pour comparer deux saisies sans tenir compte de la casse
pub fn fold_case(value: &str) -> String {
    trim_blank(value).to_lowercase()
}

/// Champ d'un formulaire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Field {
    #[display("email")]
    Email,
    #[display("password")]
    Password,
    #[display("phone number")]
    PhoneNumber,
    #[display("name")]
    Name,
    #[display("city")]
    City,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
#[display("Invalid {field}")]
pub struct InvalidInput {
    pub field: Field,
}

/// Checks that the trimmed value looks like `local@domain.tld`.
///
/// Strings such as `a@b.c` or `a@b.c.d` are accepted, there is no length cap.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(trim_blank(email))
}

/// Applique la table de bornes aux champs d'un formulaire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputValidator {
    bounds: ValidationBounds,
}

impl InputValidator {
    pub fn new(bounds: ValidationBounds) -> Self {
        Self { bounds }
    }

    pub fn bounds(&self) -> &ValidationBounds {
        &self.bounds
    }

    pub fn is_valid_email(&self, email: &str) -> bool {
        is_valid_email(email)
    }

    /// The raw password is measured, surrounding whitespace included.
    pub fn is_valid_password(&self, password: &str) -> bool {
        self.bounds.password.contains(password.chars().count())
    }

    /// Only the number of decimal digits matters, formatting is ignored.
    pub fn is_valid_phone_number(&self, phone: &str) -> bool {
        let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
        self.bounds.phone.contains(digits)
    }

    pub fn is_valid_name(&self, name: &str) -> bool {
        self.bounds.name.contains(trim_blank(name).chars().count())
    }

    pub fn email(&self, email: &str) -> Result<Email, InvalidInput> {
        if self.is_valid_email(email) {
            Ok(Email(trim_blank(email).to_owned()))
        } else {
            Err(InvalidInput { field: Field::Email })
        }
    }

    pub fn phone_number(&self, phone: &str) -> Result<PhoneNumber, InvalidInput> {
        if self.is_valid_phone_number(phone) {
            Ok(PhoneNumber(trim_blank(phone).to_owned()))
        } else {
            Err(InvalidInput {
                field: Field::PhoneNumber,
            })
        }
    }

    pub fn name(&self, name: &str) -> Result<Name, InvalidInput> {
        self.name_for(name, Field::Name)
    }

    /// Une ville suit les mêmes règles qu'un nom
    pub fn city(&self, city: &str) -> Result<Name, InvalidInput> {
        self.name_for(city, Field::City)
    }

    pub fn password<'p>(&self, password: &'p str) -> Result<&'p str, InvalidInput> {
        if self.is_valid_password(password) {
            Ok(password)
        } else {
            Err(InvalidInput {
                field: Field::Password,
            })
        }
    }

    fn name_for(&self, name: &str, field: Field) -> Result<Name, InvalidInput> {
        if self.is_valid_name(name) {
            Ok(Name(trim_blank(name).to_owned()))
        } else {
            Err(InvalidInput { field })
        }
    }
}

/// Wrapper type for an email address that has been validated
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Display)]
pub struct Email(String);

impl Email {
    /// Les adresses sont comparées sans tenir compte de la casse, y compris
    /// pour les lettres accentuées
    pub fn matches(&self, other: &str) -> bool {
        fold_case(&self.0) == fold_case(other)
    }
}

impl AsRef<str> for Email {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Wrapper type for a phone number that has been validated.
/// The formatting typed by the user is kept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Display)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn digits(&self) -> String {
        self.0.chars().filter(|c| c.is_ascii_digit()).collect()
    }
}

impl AsRef<str> for PhoneNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Wrapper type for a trimmed name that has been validated
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub struct Name(String);

impl AsRef<str> for Name {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
