//! Wrapper d'appel à Casbin pour le contrôle d'accès
//! aux comptes et aux demandes de don

use casbin::CoreApi;
use log::{error, info};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::models::{DonationRequest, UserData};

const CONFIG: &str = "access_control/model.conf";
const POLICY: &str = "access_control/policy.csv";

/// Un enforcer Casbin
pub struct Enforcer(casbin::Enforcer);

type CasbinResult = Result<(), AccessDenied>;

/// Une erreur sans détails en cas d'accès refusé
#[derive(Debug, Error)]
#[error("Accès refusé.")]
pub struct AccessDenied;

/// Un contexte contenant une référence à un enforcer et à un sujet.
pub struct Context<'ctx> {
    enforcer: &'ctx Enforcer,
    subject: &'ctx UserData,
}

impl Enforcer {
    pub fn load() -> Result<Self, casbin::Error> {
        let mut enforcer = futures::executor::block_on(casbin::Enforcer::new(CONFIG, POLICY))?;
        futures::executor::block_on(enforcer.load_policy())?;
        Ok(Enforcer(enforcer))
    }

    pub fn with_subject<'ctx>(&'ctx self, subject: &'ctx UserData) -> Context<'ctx> {
        Context {
            enforcer: self,
            subject,
        }
    }
}

impl Context<'_> {
    fn enforce<O>(&self, object: &O, action: &str) -> CasbinResult
    where
        O: Serialize + std::fmt::Debug + std::hash::Hash,
    {
        let subject = self.subject;

        info!(
            "Enforcing {}",
            json!({ "sub": subject.id, "obj": object, "act": action })
        );

        match self.enforcer.0.enforce((subject, object, action)) {
            Err(e) => {
                error!("Casbin error: {e:?}");
                Err(AccessDenied)
            }
            Ok(granted) => {
                info!("Granted: {granted}");
                if granted {
                    Ok(())
                } else {
                    Err(AccessDenied)
                }
            }
        }
    }

    pub fn read_request(&self, request: &DonationRequest) -> CasbinResult {
        self.enforce(request, "read-request")
    }

    /// Seul le donneur sollicité peut accepter ou refuser
    pub fn respond_request(&self, request: &DonationRequest) -> CasbinResult {
        self.enforce(request, "respond-request")
    }

    pub fn cancel_request(&self, request: &DonationRequest) -> CasbinResult {
        self.enforce(request, "cancel-request")
    }

    pub fn update_account(&self, target: &UserData) -> CasbinResult {
        self.enforce(target, "update-account")
    }

    pub fn delete_account(&self, target: &UserData) -> CasbinResult {
        self.enforce(target, "delete-account")
    }
}
