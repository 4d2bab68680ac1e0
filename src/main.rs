use anyhow::{anyhow, Result};
use bloodlink::authorization::Enforcer;
use bloodlink::config::AppConfig;
use bloodlink::db::Database;
use bloodlink::models::*;
use bloodlink::services::{ProfileUpdate, RegistrationForm, Service, ServiceError};
use bloodlink::utils::input_validation::{Field, InputValidator, InvalidInput};
use derive_more::Display;
use inquire::{Confirm, Password, Select, Text};
use strum::IntoEnumIterator;
use strum_macros::EnumIter;

type MenuExit = Option<()>;
const MENU_EXIT: MenuExit = None;
const MENU_LOOP: MenuExit = Some(());

/// Représente un menu texte
trait Menu {
    /// Implémente le contenu du menu. La valeur de retour
    /// doit être None si le menu souhaite terminer,
    /// ou Some(()) s'il faut le relancer.
    fn enter(&mut self) -> Result<Option<()>>;

    /// Lance le menu en boucle, en interceptant les erreurs,
    /// sauf si le menu souhaite quitter.
    fn enter_loop(&mut self) {
        while let Some(result) = self.enter().transpose() {
            if let Err(error) = result {
                eprintln!("Erreur: {error}");
            }
        }
    }
}

/// Message affiché à l'utilisateur pour un champ refusé
fn field_hint(field: Field, validator: &InputValidator) -> String {
    let bounds = validator.bounds();
    match field {
        Field::Email => "L'adresse email doit avoir la forme nom@domaine.tld".to_string(),
        Field::Password => format!(
            "Le mot de passe doit contenir entre {} et {} caractères",
            bounds.password.min_length, bounds.password.max_length
        ),
        Field::PhoneNumber => format!(
            "Le numéro de téléphone doit contenir entre {} et {} chiffres",
            bounds.phone.min_length, bounds.phone.max_length
        ),
        Field::Name => format!(
            "Le nom doit contenir entre {} et {} caractères",
            bounds.name.min_length, bounds.name.max_length
        ),
        Field::City => format!(
            "La ville doit contenir entre {} et {} caractères",
            bounds.name.min_length, bounds.name.max_length
        ),
    }
}

/// Un champ refusé, avec le message à afficher
#[derive(Debug, Display)]
struct FieldError(String);

impl std::error::Error for FieldError {}

/// Convertit une erreur du service en message lisible pour un champ refusé
fn explain(error: ServiceError, validator: &InputValidator) -> anyhow::Error {
    match error {
        ServiceError::InvalidInput(InvalidInput { field }) => {
            FieldError(field_hint(field, validator)).into()
        }
        other => other.into(),
    }
}

pub struct App {
    service: Service,
}

impl App {
    pub fn new(service: Service) -> Self {
        App { service }
    }

    pub fn start(&mut self) -> Result<()> {
        println!("Bienvenue sur BLOODLINK, la mise en relation des donneurs de sang.");
        self.enter_loop();
        self.service.save()?;
        Ok(())
    }

    fn register(&mut self) -> Result<()> {
        let validator = *self.service.validator();

        let name = Text::new("Nom complet:").prompt()?;
        let email = Text::new("Adresse email:").prompt()?;
        let phone = Text::new("Numéro de téléphone:").prompt()?;
        let password = Password::new("Mot de passe:")
            .with_display_mode(inquire::PasswordDisplayMode::Masked)
            .with_help_message(&field_hint(Field::Password, &validator))
            .prompt()?;
        let blood_type = Select::new("Groupe sanguin:", BloodType::iter().collect()).prompt()?;
        let city = Text::new("Ville:").prompt()?;

        self.service
            .register(RegistrationForm {
                name,
                email,
                phone,
                password,
                blood_type,
                city,
            })
            .map_err(|e| explain(e, &validator))?;

        println!("[*] Compte créé, vous pouvez vous connecter.");
        Ok(())
    }
}

impl Menu for App {
    fn enter(&mut self) -> Result<MenuExit> {
        #[derive(EnumIter, Display)]
        enum Choice {
            #[display("Créer un compte")]
            Register,
            #[display("Se connecter")]
            Login,
            #[display("Quitter")]
            Exit,
        }

        let choice = Select::new("Que voulez-vous faire ?", Choice::iter().collect()).prompt()?;

        match choice {
            Choice::Register => {
                self.register()?;
                Ok(MENU_LOOP)
            }
            Choice::Login => {
                let email = Text::new("Adresse email:").prompt()?;
                let password = Password::new("Entrez votre mot de passe : ")
                    .without_confirmation()
                    .with_display_mode(inquire::PasswordDisplayMode::Masked)
                    .prompt()?;

                let user_id = self.service.login(&email, &password)?;
                let name = self.service.get_user(user_id)?.name.clone();

                eprintln!("[*] Bienvenue, {name}.");
                UserMenu {
                    service: &mut self.service,
                    user_id,
                }
                .enter_loop();
                self.service.logout();
                self.service.save()?;
                Ok(MENU_LOOP)
            }
            Choice::Exit => Ok(MENU_EXIT),
        }
    }
}

struct UserMenu<'srv> {
    service: &'srv mut Service,
    user_id: UserID,
}

impl UserMenu<'_> {
    fn search(&mut self) -> Result<()> {
        let me = self.service.get_user(self.user_id)?.blood_type;
        let blood_type = Select::new("Groupe sanguin recherché:", BloodType::iter().collect())
            .with_starting_cursor(BloodType::iter().position(|b| b == me).unwrap_or(0))
            .prompt()?;
        let city = Text::new("Ville (laisser vide pour toutes):").prompt()?;
        let city = Some(city.trim()).filter(|c| !c.is_empty());

        let donors: Vec<UserData> = self
            .service
            .search_donors(blood_type, city)
            .into_iter()
            .cloned()
            .collect();

        if donors.is_empty() {
            println!("[*] Aucun donneur compatible trouvé");
            return Ok(());
        }

        let Some(donor) = Select::new("Choisissez un donneur:", donors).prompt_skippable()? else {
            return Ok(());
        };

        println!(
            "\n{}\nGroupe: {}\nVille: {}\nTéléphone: {}\nEmail: {}\n",
            donor.name, donor.blood_type, donor.location, donor.phone, donor.email
        );

        if !self.service.can_request_from(&donor) {
            println!("[*] Ce donneur n'est pas compatible avec votre groupe ({me})");
            return Ok(());
        }

        if Confirm::new("Envoyer une demande de don à ce donneur ?")
            .with_default(false)
            .prompt()?
        {
            let message = Text::new("Message:").prompt()?;
            self.service.send_request(donor.id, message)?;
            println!("[*] Demande envoyée");
        }
        Ok(())
    }

    fn update_profile(&mut self) -> Result<()> {
        let validator = *self.service.validator();
        let user = self.service.get_user(self.user_id)?;

        let phone = Text::new("Numéro de téléphone:")
            .with_initial_value(user.phone.as_ref())
            .prompt()?;
        let city = Text::new("Ville:")
            .with_initial_value(user.location.city.as_ref())
            .prompt()?;
        let available = Confirm::new("Apparaître dans les recherches de donneurs ?")
            .with_default(user.available)
            .prompt()?;

        self.service
            .update_profile(
                self.user_id,
                ProfileUpdate {
                    phone: Some(phone),
                    city: Some(city),
                    available: Some(available),
                },
            )
            .map_err(|e| explain(e, &validator))?;
        Ok(())
    }
}

impl Menu for UserMenu<'_> {
    fn enter(&mut self) -> Result<Option<()>> {
        #[derive(EnumIter, Display)]
        enum Choice {
            #[display("Chercher un donneur")]
            Search,

            #[display("Demandes reçues")]
            Incoming,

            #[display("Demandes envoyées")]
            Outgoing,

            #[display("Modifier mon profil")]
            UpdateProfile,

            #[display("Supprimer mon compte")]
            DeleteAccount,

            #[display("Se déconnecter")]
            Logout,
        }

        let choice = Select::new("Que voulez-vous faire ?", Choice::iter().collect()).prompt()?;
        match choice {
            Choice::Search => self.search()?,

            Choice::Incoming => RequestsMenu {
                service: self.service,
                incoming: true,
            }
            .enter_loop(),

            Choice::Outgoing => RequestsMenu {
                service: self.service,
                incoming: false,
            }
            .enter_loop(),

            Choice::UpdateProfile => self.update_profile()?,

            Choice::DeleteAccount => {
                if Confirm::new("VOULEZ-VOUS VRAIMENT EFFACER VOTRE COMPTE ?")
                    .with_help_message("Toutes vos demandes de don seront également effacées.")
                    .prompt()?
                {
                    self.service.delete_account(self.user_id)?;
                    return Ok(MENU_EXIT);
                }
            }

            Choice::Logout => return Ok(MENU_EXIT),
        };
        Ok(MENU_LOOP)
    }
}

struct RequestsMenu<'srv> {
    service: &'srv mut Service,
    incoming: bool,
}

/// Une demande accompagnée du nom de l'autre partie
#[derive(Display)]
#[display("{other}: {request}")]
struct RequestEntry {
    other: String,
    request: DonationRequest,
}

impl Menu for RequestsMenu<'_> {
    fn enter(&mut self) -> Result<Option<()>> {
        let requests = if self.incoming {
            self.service.incoming_requests()
        } else {
            self.service.outgoing_requests()
        };

        let entries: Vec<RequestEntry> = requests
            .into_iter()
            .map(|request| {
                let other = if self.incoming {
                    request.requester
                } else {
                    request.donor
                };
                RequestEntry {
                    other: self
                        .service
                        .get_user(other)
                        .map(|u| u.name.to_string())
                        .unwrap_or_default(),
                    request: request.clone(),
                }
            })
            .collect();

        if entries.is_empty() {
            println!("[*] Aucune demande");
            return Ok(MENU_EXIT);
        }

        let Some(entry) = Select::new("Choisissez une demande:", entries).prompt_skippable()?
        else {
            return Ok(MENU_EXIT);
        };

        let request = entry.request;
        println!(
            "\n[{}]\nGroupe: {}\nÉtat: {}\n\n{}\n===============",
            request.id, request.blood_type, request.status, request.message
        );

        if !request.is_pending() {
            return Ok(MENU_LOOP);
        }

        if self.incoming {
            let requester = self.service.get_user(request.requester)?;
            println!("Contact: {} / {}", requester.phone, requester.email);

            let accept = Select::new("Réponse:", vec!["Accepter", "Refuser"])
                .prompt_skippable()?
                .map(|answer| answer == "Accepter");
            if let Some(accept) = accept {
                self.service.respond_request(request.id, accept)?;
            }
        } else if Confirm::new("Annuler cette demande ?")
            .with_default(false)
            .prompt()?
        {
            self.service.cancel_request(request.id)?;
        }

        Ok(MENU_LOOP)
    }
}

fn main() -> Result<()> {
    let config = AppConfig::load()?;
    simple_logging::log_to_file(&config.log_file, log::LevelFilter::Info)?;

    let db = Database::open(config.db_file.clone())
        .map_err(|e| anyhow!("Impossible d'ouvrir {}: {e}", config.db_file.display()))?;
    let enforcer = Enforcer::load()?;
    App::new(Service::new(db, enforcer, InputValidator::new(config.bounds))).start()
}
