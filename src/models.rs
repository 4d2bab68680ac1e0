//! Modèle de données

use derive_more::Display;
use serde::{Deserialize, Serialize};
use strum_macros::EnumIter;
use uuid::Uuid;

use crate::utils::input_validation::{fold_case, Email, Name, PhoneNumber};
use crate::utils::password_utils::PWHash;

/// Un groupe sanguin dans le système ABO, avec le facteur Rhésus
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Display)]
pub enum BloodType {
    #[display("A+")]
    APositive,
    #[display("A-")]
    ANegative,
    #[display("B+")]
    BPositive,
    #[display("B-")]
    BNegative,
    #[display("AB+")]
    ABPositive,
    #[display("AB-")]
    ABNegative,
    #[display("O+")]
    OPositive,
    #[display("O-")]
    ONegative,
}

impl BloodType {
    fn has_a(self) -> bool {
        matches!(
            self,
            Self::APositive | Self::ANegative | Self::ABPositive | Self::ABNegative
        )
    }

    fn has_b(self) -> bool {
        matches!(
            self,
            Self::BPositive | Self::BNegative | Self::ABPositive | Self::ABNegative
        )
    }

    fn rh_positive(self) -> bool {
        matches!(
            self,
            Self::APositive | Self::BPositive | Self::ABPositive | Self::OPositive
        )
    }

    /// Red cell compatibility: every antigen of the donor must also be
    /// present on the recipient.
    pub fn can_donate_to(self, recipient: BloodType) -> bool {
        (!self.has_a() || recipient.has_a())
            && (!self.has_b() || recipient.has_b())
            && (!self.rh_positive() || recipient.rh_positive())
    }

    /// Les groupes qui peuvent donner à ce groupe
    pub fn compatible_donors(self) -> Vec<BloodType> {
        use strum::IntoEnumIterator;

        BloodType::iter()
            .filter(|donor| donor.can_donate_to(self))
            .collect()
    }
}

/// Un identifiant unique d'utilisateur.
#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord, Display,
)]
pub struct UserID(Uuid);

impl UserID {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserID {
    fn default() -> Self {
        Self::new()
    }
}

/// Un identifiant unique de demande de don
#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord, Display,
)]
pub struct RequestID(Uuid);

impl RequestID {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestID {
    fn default() -> Self {
        Self::new()
    }
}

/// Le lieu où un donneur peut se rendre
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash, Display)]
#[display("{city}")]
pub struct Location {
    pub city: Name,
}

impl Location {
    pub fn is_in(&self, city: &str) -> bool {
        fold_case(self.city.as_ref()) == fold_case(city)
    }
}

/// Les données associées à un utilisateur.
///
/// Tout utilisateur peut chercher des donneurs. Il n'apparaît lui-même
/// dans les recherches que s'il est disponible.
#[derive(Debug, Serialize, Deserialize, Clone, Hash, Display)]
#[display("{name} ({blood_type}, {location})")]
pub struct UserData {
    pub id: UserID,
    pub name: Name,
    pub email: Email,
    pub phone: PhoneNumber,
    pub password: PWHash,
    pub blood_type: BloodType,
    pub location: Location,
    pub available: bool,
}

impl UserData {
    /// Available and compatible with the given recipient blood type
    pub fn can_donate_to(&self, recipient: BloodType) -> bool {
        self.available && self.blood_type.can_donate_to(recipient)
    }
}

/// L'état d'une demande de don
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum RequestStatus {
    #[display("En attente")]
    Pending,
    #[display("Acceptée")]
    Accepted,
    #[display("Refusée")]
    Declined,
    #[display("Annulée")]
    Cancelled,
}

/// Une demande de don envoyée par un utilisateur à un donneur
#[derive(Debug, Serialize, Deserialize, Clone, Hash, Display)]
#[display("[{status}] {blood_type}: {message}")]
pub struct DonationRequest {
    pub id: RequestID,
    pub requester: UserID,
    pub donor: UserID,
    pub blood_type: BloodType,
    pub message: String,
    pub status: RequestStatus,
}

impl DonationRequest {
    pub fn involves(&self, user: UserID) -> bool {
        self.requester == user || self.donor == user
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }
}
