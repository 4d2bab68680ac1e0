//! API du service de mise en relation, et point d'entrée unique pour la
//! validation des saisies et le contrôle d'accès.
//!
use crate::authorization::{AccessDenied, Context, Enforcer};
use crate::db::{DBError, Database};
use crate::models::{
    BloodType, DonationRequest, Location, RequestID, RequestStatus, UserData, UserID,
};
use crate::utils::input_validation::{InputValidator, InvalidInput};
use crate::utils::password_utils::{hash, verify};
use argon2::password_hash;
use log::info;
use thiserror::Error;

pub struct Service {
    user: Option<UserID>,
    db: Database,
    enforcer: Enforcer,
    validator: InputValidator,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    AccessDenied(#[from] AccessDenied),

    #[error(transparent)]
    InvalidInput(#[from] InvalidInput),

    #[error("Adresse email déjà inscrite")]
    UserAlreadyExists,

    #[error(transparent)]
    DBError(#[from] DBError),

    #[error("Impossible de hacher le mot de passe: {0}")]
    Hashing(password_hash::Error),

    #[error("Ce donneur n'est pas disponible ou pas compatible")]
    IncompatibleDonor,

    #[error("Une demande est déjà en attente pour ce donneur")]
    DuplicateRequest,

    #[error("Cette demande n'est plus en attente")]
    RequestClosed,
}

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("Mauvais mot de passe ou utilisateur inconnu")]
    InvalidCredentials,
}

/// Les champs bruts du formulaire d'inscription
#[derive(Debug, Clone)]
pub struct RegistrationForm {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub blood_type: BloodType,
    pub city: String,
}

/// Les champs modifiables d'un profil. `None` laisse la valeur inchangée.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub phone: Option<String>,
    pub city: Option<String>,
    pub available: Option<bool>,
}

impl Service {
    pub fn new(db: Database, enforcer: Enforcer, validator: InputValidator) -> Self {
        Self {
            db,
            user: None,
            enforcer,
            validator,
        }
    }

    pub fn save(&self) -> Result<(), std::io::Error> {
        self.db.save()
    }

    pub fn validator(&self) -> &InputValidator {
        &self.validator
    }

    /// Enregistre un nouvel utilisateur, disponible comme donneur.
    pub fn register(&mut self, form: RegistrationForm) -> Result<UserID, ServiceError> {
        let name = self.validator.name(&form.name)?;
        let email = self.validator.email(&form.email)?;
        let phone = self.validator.phone_number(&form.phone)?;
        let password = self.validator.password(&form.password)?;
        let city = self.validator.city(&form.city)?;

        if self.db.lookup_email(email.as_ref()).is_some() {
            return Err(ServiceError::UserAlreadyExists);
        }

        let password = hash(password).map_err(ServiceError::Hashing)?;

        let new_uid = UserID::new();
        let new_user = UserData {
            id: new_uid,
            name,
            email,
            phone,
            password,
            blood_type: form.blood_type,
            location: Location { city },
            available: true,
        };

        info!("Compte créé avec succès pour {}", &new_user.email);
        self.db.store_user(new_user);
        Ok(new_uid)
    }

    /// Obtient les données courantes de l'utilisateur connecté
    fn get_subject(&self) -> Result<&UserData, ServiceError> {
        let user = self.user.ok_or(AccessDenied)?;
        Ok(self.db.get_user(user)?)
    }

    /// Crée un contexte d'autorisation ayant l'utilisateur connecté comme sujet
    fn enforce(&self) -> Result<Context<'_>, ServiceError> {
        Ok(self.enforcer.with_subject(self.get_subject()?))
    }

    /// Vérifie si le mot de passe est correct, et si oui, enregistre
    /// l'utilisateur comme utilisateur courant.
    pub fn login(&mut self, email: &str, password: &str) -> Result<UserID, LoginError> {
        let user = self.db.lookup_email(email);
        let hash = user.map(|u| &u.password);
        if !verify(password, hash) {
            info!("Échec de connexion");
            return Err(LoginError::InvalidCredentials);
        }
        let user_id = user.ok_or(LoginError::InvalidCredentials)?.id;
        info!("Connexion de {user_id}");
        self.user = Some(user_id);
        Ok(user_id)
    }

    /// Ferme la session
    pub fn logout(&mut self) {
        self.user = None
    }

    pub fn current_user(&self) -> Option<&UserData> {
        self.get_subject().ok()
    }

    pub fn get_user(&self, user_id: UserID) -> Result<&UserData, ServiceError> {
        Ok(self.db.get_user(user_id)?)
    }

    /// Cherche les donneurs disponibles pouvant donner au groupe demandé,
    /// éventuellement dans une ville donnée. L'utilisateur courant est exclu.
    pub fn search_donors(&self, blood_type: BloodType, city: Option<&str>) -> Vec<&UserData> {
        let me = self.user;
        let mut donors: Vec<&UserData> = self
            .db
            .list_users()
            .filter(|u| Some(u.id) != me)
            .filter(|u| u.can_donate_to(blood_type))
            .filter(|u| city.map_or(true, |city| u.location.is_in(city)))
            .collect();
        donors.sort_by(|a, b| a.name.cmp(&b.name));
        donors
    }

    /// Vrai si l'utilisateur connecté peut envoyer une demande à ce donneur.
    /// Une recherche pour un autre groupe que le sien peut lister des
    /// donneurs qui ne lui sont pas compatibles.
    pub fn can_request_from(&self, donor: &UserData) -> bool {
        self.get_subject()
            .map(|subject| Self::can_ask(subject, donor))
            .unwrap_or(false)
    }

    fn can_ask(subject: &UserData, donor: &UserData) -> bool {
        donor.id != subject.id && donor.can_donate_to(subject.blood_type)
    }

    /// Envoie une demande de don à un donneur compatible avec le groupe
    /// de l'utilisateur connecté.
    pub fn send_request(&mut self, donor_id: UserID, message: String) -> Result<RequestID, ServiceError> {
        let subject = self.get_subject()?;
        let donor = self.db.get_user(donor_id)?;

        if !Self::can_ask(subject, donor) {
            return Err(ServiceError::IncompatibleDonor);
        }

        let duplicate = self.db.list_requests().any(|r| {
            r.is_pending() && r.requester == subject.id && r.donor == donor_id
        });
        if duplicate {
            return Err(ServiceError::DuplicateRequest);
        }

        let request = DonationRequest {
            id: RequestID::new(),
            requester: subject.id,
            donor: donor_id,
            blood_type: subject.blood_type,
            message: message.trim().to_owned(),
            status: RequestStatus::Pending,
        };
        let id = request.id;

        info!("Demande {id} envoyée par {} à {donor_id}", subject.id);
        self.db.store_request(request);
        Ok(id)
    }

    pub fn get_request(&self, request_id: RequestID) -> Result<&DonationRequest, ServiceError> {
        let request = self.db.get_request(request_id)?;
        self.enforce()?.read_request(request)?;
        Ok(request)
    }

    /// Le donneur accepte ou refuse une demande en attente
    pub fn respond_request(&mut self, request_id: RequestID, accept: bool) -> Result<(), ServiceError> {
        let request = self.db.get_request(request_id)?;
        self.enforce()?.respond_request(request)?;

        let status = if accept {
            RequestStatus::Accepted
        } else {
            RequestStatus::Declined
        };
        self.transition(request_id, status)
    }

    /// Le demandeur retire une demande en attente
    pub fn cancel_request(&mut self, request_id: RequestID) -> Result<(), ServiceError> {
        let request = self.db.get_request(request_id)?;
        self.enforce()?.cancel_request(request)?;

        self.transition(request_id, RequestStatus::Cancelled)
    }

    fn transition(&mut self, request_id: RequestID, status: RequestStatus) -> Result<(), ServiceError> {
        let request = self.db.get_request_mut(request_id)?;
        if !request.is_pending() {
            return Err(ServiceError::RequestClosed);
        }
        request.status = status;
        info!("Demande {request_id}: {status:?}");
        Ok(())
    }

    /// Demandes reçues par l'utilisateur connecté
    pub fn incoming_requests(&self) -> Vec<&DonationRequest> {
        self.requests_where(|me, r| r.donor == me)
    }

    /// Demandes envoyées par l'utilisateur connecté
    pub fn outgoing_requests(&self) -> Vec<&DonationRequest> {
        self.requests_where(|me, r| r.requester == me)
    }

    fn requests_where<F>(&self, pred: F) -> Vec<&DonationRequest>
    where
        F: Fn(UserID, &DonationRequest) -> bool,
    {
        let Some(me) = self.user else {
            return Vec::new();
        };
        let mut requests: Vec<&DonationRequest> =
            self.db.list_requests().filter(|r| pred(me, *r)).collect();
        // pending first
        requests.sort_by_key(|r| !r.is_pending());
        requests
    }

    /// Modifie le téléphone, la ville ou la disponibilité d'un utilisateur.
    /// Aucun champ n'est modifié si l'un d'eux est invalide.
    pub fn update_profile(&mut self, user_id: UserID, update: ProfileUpdate) -> Result<(), ServiceError> {
        let user = self.db.get_user(user_id)?;
        self.enforce()?.update_account(user)?;

        let phone = update
            .phone
            .as_deref()
            .map(|p| self.validator.phone_number(p))
            .transpose()?;
        let city = update
            .city
            .as_deref()
            .map(|c| self.validator.city(c))
            .transpose()?;

        let user = self.db.get_user_mut(user_id)?;
        if let Some(phone) = phone {
            user.phone = phone;
        }
        if let Some(city) = city {
            user.location = Location { city };
        }
        if let Some(available) = update.available {
            user.available = available;
        }
        Ok(())
    }

    /// Supprime un compte et toutes les demandes qui le concernent.
    /// Si c'est le compte courant, la session est fermée.
    pub fn delete_account(&mut self, user_id: UserID) -> Result<(), ServiceError> {
        let user = self.db.get_user(user_id)?;
        self.enforce()?.delete_account(user)?;

        self.db.remove_user(user_id)?;
        if self.user == Some(user_id) {
            self.logout();
        }
        info!("Compte {user_id} supprimé");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LengthBounds, ValidationBounds};
    use crate::utils::input_validation::Field;

    fn service() -> Service {
        Service::new(
            Database::default(),
            Enforcer::load().expect("Error in loading Enforcer"),
            InputValidator::new(ValidationBounds {
                password: LengthBounds::new(8, 64),
                phone: LengthBounds::new(10, 15),
                name: LengthBounds::new(2, 50),
            }),
        )
    }

    fn form(name: &str, blood_type: BloodType, city: &str) -> RegistrationForm {
        RegistrationForm {
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            phone: "(021) 555-0199".to_string(),
            password: "password123".to_string(),
            blood_type,
            city: city.to_string(),
        }
    }

    fn register_and_login(service: &mut Service, name: &str, blood_type: BloodType, city: &str) -> UserID {
        let id = service.register(form(name, blood_type, city)).unwrap();
        service
            .login(&format!("{}@example.com", name.to_lowercase()), "password123")
            .unwrap();
        id
    }

    mod registration_tests {
        use super::*;

        #[test]
        fn test_register_and_login() {
            let mut service = service();
            let id = service
                .register(form("Alice", BloodType::APositive, "Lausanne"))
                .unwrap();

            assert_eq!(service.login("  ALICE@example.com", "password123").unwrap(), id);
            assert_eq!(service.current_user().map(|u| u.id), Some(id));

            service.logout();
            assert!(service.current_user().is_none());
        }

        #[test]
        fn test_register_trims_fields() {
            let mut service = service();
            let mut f = form("Alice", BloodType::APositive, "Lausanne");
            f.name = "  Alice  ".to_string();
            f.email = " alice@example.com ".to_string();
            let id = service.register(f).unwrap();

            let user = service.get_user(id).unwrap();
            assert_eq!(user.name.as_ref(), "Alice");
            assert_eq!(user.email.as_ref(), "alice@example.com");
            assert!(user.available);
        }

        #[test]
        fn test_register_rejects_each_field() {
            let cases: Vec<(fn(&mut RegistrationForm), Field)> = vec![
                (|f: &mut RegistrationForm| f.name = " A ".to_string(), Field::Name),
                (|f: &mut RegistrationForm| f.email = "alice.example.com".to_string(), Field::Email),
                (|f: &mut RegistrationForm| f.phone = "555-0199".to_string(), Field::PhoneNumber),
                (|f: &mut RegistrationForm| f.password = "short".to_string(), Field::Password),
                (|f: &mut RegistrationForm| f.city = "".to_string(), Field::City),
            ];

            for (corrupt, field) in cases {
                let mut service = service();
                let mut f = form("Alice", BloodType::APositive, "Lausanne");
                corrupt(&mut f);

                match service.register(f) {
                    Err(ServiceError::InvalidInput(err)) => assert_eq!(err.field, field),
                    other => panic!("Invalid {field} was accepted: {other:?}"),
                }
            }
        }

        #[test]
        fn test_duplicate_email() {
            let mut service = service();
            service
                .register(form("Alice", BloodType::APositive, "Lausanne"))
                .unwrap();

            let mut again = form("Alice", BloodType::BPositive, "Genève");
            again.email = "ALICE@EXAMPLE.COM".to_string();
            assert!(matches!(
                service.register(again),
                Err(ServiceError::UserAlreadyExists)
            ));
        }

        #[test]
        fn test_duplicate_email_with_accented_capital() {
            let mut service = service();
            let mut first = form("Elise", BloodType::APositive, "Lausanne");
            first.email = "Élise@exemple.ch".to_string();
            service.register(first).unwrap();

            let mut again = form("Elise", BloodType::APositive, "Lausanne");
            again.email = "élise@exemple.ch".to_string();
            assert!(matches!(
                service.register(again),
                Err(ServiceError::UserAlreadyExists)
            ));
            assert!(service.login("ÉLISE@EXEMPLE.CH", "password123").is_ok());
        }

        #[test]
        fn test_bad_credentials() {
            let mut service = service();
            service
                .register(form("Alice", BloodType::APositive, "Lausanne"))
                .unwrap();

            assert!(service.login("alice@example.com", "wrong-password").is_err());
            assert!(service.login("nobody@example.com", "password123").is_err());
            assert!(service.current_user().is_none());
        }
    }

    mod search_tests {
        use super::*;

        #[test]
        fn test_search_compatible_donors() {
            let mut service = service();
            service.register(form("Zoe", BloodType::ONegative, "Lausanne")).unwrap();
            service.register(form("Bob", BloodType::ANegative, "Genève")).unwrap();
            service.register(form("Carl", BloodType::BPositive, "Lausanne")).unwrap();
            register_and_login(&mut service, "Alice", BloodType::ANegative, "Lausanne");

            let names: Vec<&str> = service
                .search_donors(BloodType::ANegative, None)
                .iter()
                .map(|u| u.name.as_ref())
                .collect();
            // Alice is excluded even though she matches
            assert_eq!(names, vec!["Bob", "Zoe"]);
        }

        #[test]
        fn test_search_by_city() {
            let mut service = service();
            service.register(form("Zoe", BloodType::ONegative, "Lausanne")).unwrap();
            service.register(form("Bob", BloodType::ONegative, "Genève")).unwrap();

            let donors = service.search_donors(BloodType::ABPositive, Some(" lausanne "));
            assert_eq!(donors.len(), 1);
            assert_eq!(donors[0].name.as_ref(), "Zoe");
        }

        #[test]
        fn test_search_for_other_type_lists_donors_i_cannot_ask() {
            let mut service = service();
            let bob = service.register(form("Bob", BloodType::BPositive, "Lausanne")).unwrap();
            let zoe = service.register(form("Zoe", BloodType::ONegative, "Lausanne")).unwrap();
            register_and_login(&mut service, "Alice", BloodType::APositive, "Lausanne");

            let donors: Vec<UserData> = service
                .search_donors(BloodType::BPositive, None)
                .into_iter()
                .cloned()
                .collect();
            assert_eq!(donors.len(), 2);

            let askable: Vec<UserID> = donors
                .iter()
                .filter(|d| service.can_request_from(d))
                .map(|d| d.id)
                .collect();
            assert_eq!(askable, vec![zoe]);

            assert!(matches!(
                service.send_request(bob, String::new()),
                Err(ServiceError::IncompatibleDonor)
            ));
            assert!(service.send_request(zoe, String::new()).is_ok());
        }

        #[test]
        fn test_cannot_ask_without_session() {
            let mut service = service();
            let zoe = service.register(form("Zoe", BloodType::ONegative, "Lausanne")).unwrap();
            let zoe = service.get_user(zoe).unwrap().clone();
            assert!(!service.can_request_from(&zoe));
        }

        #[test]
        fn test_unavailable_donors_are_hidden() {
            let mut service = service();
            let zoe = register_and_login(&mut service, "Zoe", BloodType::ONegative, "Lausanne");
            service
                .update_profile(
                    zoe,
                    ProfileUpdate {
                        available: Some(false),
                        ..Default::default()
                    },
                )
                .unwrap();
            service.logout();

            assert!(service.search_donors(BloodType::ONegative, None).is_empty());
        }
    }

    mod request_tests {
        use super::*;

        #[test]
        fn test_request_accept_flow() {
            let mut service = service();
            let donor = register_and_login(&mut service, "Zoe", BloodType::ONegative, "Lausanne");
            let alice = register_and_login(&mut service, "Alice", BloodType::APositive, "Lausanne");

            let request = service.send_request(donor, "  Opération jeudi  ".to_string()).unwrap();
            assert_eq!(service.outgoing_requests().len(), 1);
            assert!(service.incoming_requests().is_empty());
            assert_eq!(service.get_request(request).unwrap().message, "Opération jeudi");

            // The requester cannot answer for the donor
            assert!(matches!(
                service.respond_request(request, true),
                Err(ServiceError::AccessDenied(_))
            ));

            service.login("zoe@example.com", "password123").unwrap();
            assert_eq!(service.incoming_requests().len(), 1);
            service.respond_request(request, true).unwrap();

            let stored = service.get_request(request).unwrap();
            assert_eq!(stored.status, RequestStatus::Accepted);
            assert_eq!(stored.requester, alice);

            // Already answered
            assert!(matches!(
                service.respond_request(request, false),
                Err(ServiceError::RequestClosed)
            ));
        }

        #[test]
        fn test_cancel_request() {
            let mut service = service();
            let donor = register_and_login(&mut service, "Zoe", BloodType::ONegative, "Lausanne");
            register_and_login(&mut service, "Alice", BloodType::APositive, "Lausanne");

            let request = service.send_request(donor, String::new()).unwrap();
            service.cancel_request(request).unwrap();
            assert_eq!(
                service.get_request(request).unwrap().status,
                RequestStatus::Cancelled
            );

            // A cancelled request does not block a new one
            assert!(service.send_request(donor, String::new()).is_ok());
        }

        #[test]
        fn test_duplicate_pending_request() {
            let mut service = service();
            let donor = register_and_login(&mut service, "Zoe", BloodType::ONegative, "Lausanne");
            register_and_login(&mut service, "Alice", BloodType::APositive, "Lausanne");

            service.send_request(donor, String::new()).unwrap();
            assert!(matches!(
                service.send_request(donor, String::new()),
                Err(ServiceError::DuplicateRequest)
            ));
        }

        #[test]
        fn test_incompatible_donor() {
            let mut service = service();
            let donor = register_and_login(&mut service, "Bob", BloodType::BPositive, "Lausanne");
            let alice = register_and_login(&mut service, "Alice", BloodType::APositive, "Lausanne");

            assert!(matches!(
                service.send_request(donor, String::new()),
                Err(ServiceError::IncompatibleDonor)
            ));
            assert!(matches!(
                service.send_request(alice, String::new()),
                Err(ServiceError::IncompatibleDonor)
            ));
        }

        #[test]
        fn test_request_requires_login() {
            let mut service = service();
            let donor = service.register(form("Zoe", BloodType::ONegative, "Lausanne")).unwrap();

            assert!(matches!(
                service.send_request(donor, String::new()),
                Err(ServiceError::AccessDenied(_))
            ));
            assert!(service.incoming_requests().is_empty());
        }
    }

    mod account_tests {
        use super::*;

        #[test]
        fn test_update_profile() {
            let mut service = service();
            let alice = register_and_login(&mut service, "Alice", BloodType::APositive, "Lausanne");

            service
                .update_profile(
                    alice,
                    ProfileUpdate {
                        phone: Some("+41 79 000 11 22".to_string()),
                        city: Some("Genève".to_string()),
                        available: None,
                    },
                )
                .unwrap();

            let user = service.get_user(alice).unwrap();
            assert_eq!(user.phone.digits(), "41790001122");
            assert!(user.location.is_in("GENÈVE"));
            assert!(user.available);
        }

        #[test]
        fn test_invalid_update_changes_nothing() {
            let mut service = service();
            let alice = register_and_login(&mut service, "Alice", BloodType::APositive, "Lausanne");

            let result = service.update_profile(
                alice,
                ProfileUpdate {
                    phone: Some("+41 79 000 11 22".to_string()),
                    city: Some("X".to_string()),
                    available: Some(false),
                },
            );
            assert!(matches!(result, Err(ServiceError::InvalidInput(_))));

            let user = service.get_user(alice).unwrap();
            assert_eq!(user.phone.as_ref(), "(021) 555-0199");
            assert!(user.available);
        }

        #[test]
        fn test_cannot_update_someone_else() {
            let mut service = service();
            let zoe = service.register(form("Zoe", BloodType::ONegative, "Lausanne")).unwrap();
            register_and_login(&mut service, "Alice", BloodType::APositive, "Lausanne");

            assert!(matches!(
                service.update_profile(zoe, ProfileUpdate::default()),
                Err(ServiceError::AccessDenied(_))
            ));
            assert!(matches!(
                service.delete_account(zoe),
                Err(ServiceError::AccessDenied(_))
            ));
        }

        #[test]
        fn test_delete_account_removes_requests() {
            let mut service = service();
            let donor = register_and_login(&mut service, "Zoe", BloodType::ONegative, "Lausanne");
            let alice = register_and_login(&mut service, "Alice", BloodType::APositive, "Lausanne");
            service.send_request(donor, String::new()).unwrap();

            service.delete_account(alice).unwrap();
            assert!(service.current_user().is_none());
            assert!(service.get_user(alice).is_err());

            service.login("zoe@example.com", "password123").unwrap();
            assert!(service.incoming_requests().is_empty());
        }
    }
}
