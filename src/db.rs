//! Stockage des données en mémoire, avec sauvegarde en JSON

use crate::models::{DonationRequest, RequestID, UserData, UserID};
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs::File,
    io::{self, ErrorKind::NotFound},
    path::PathBuf,
};
use thiserror::Error;

#[derive(Serialize, Deserialize, Default)]
pub struct Database {
    #[serde(skip)]
    path: Option<PathBuf>,
    users: HashMap<UserID, UserData>,
    requests: HashMap<RequestID, DonationRequest>,
}

#[derive(Debug, Error)]
pub enum DBError {
    #[error("Invalid user ID: {0}")]
    InvalidUserID(UserID),
    #[error("Invalid request ID: {0}")]
    InvalidRequestID(RequestID),
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self, io::Error> {
        match File::open(&path) {
            Ok(f) => {
                let mut db: Self = serde_json::from_reader(f)?;
                db.path = Some(path);
                Ok(db)
            }

            // Fichier non existant, on le crée
            Err(not_found) if not_found.kind() == NotFound => {
                info!("DB file not found, creating new empty DB");
                let new_db = Database {
                    path: Some(path),
                    ..Database::default()
                };

                // On vérifie la sauvegarde immédiatement pour diminuer le risque de perte de données
                new_db.save()?;
                Ok(new_db)
            }

            Err(other) => Err(other),
        }
    }

    /// Sans chemin (base en mémoire), ne fait rien
    pub fn save(&self) -> Result<(), io::Error> {
        if let Some(path) = &self.path {
            let file = File::create(path)?;
            serde_json::to_writer_pretty(file, self)?;
        }
        Ok(())
    }

    pub fn get_user(&self, user: UserID) -> Result<&UserData, DBError> {
        self.users.get(&user).ok_or(DBError::InvalidUserID(user))
    }

    pub fn get_user_mut(&mut self, user: UserID) -> Result<&mut UserData, DBError> {
        self.users
            .get_mut(&user)
            .ok_or(DBError::InvalidUserID(user))
    }

    pub fn lookup_email(&self, email: &str) -> Option<&UserData> {
        self.users.values().find(|user| user.email.matches(email))
    }

    pub fn store_user(&mut self, data: UserData) {
        self.users.insert(data.id, data);
    }

    pub fn list_users(&self) -> impl Iterator<Item = &UserData> + '_ {
        self.users.values()
    }

    /// Supprime un utilisateur et toutes les demandes qui le concernent
    pub fn remove_user(&mut self, user: UserID) -> Result<UserData, DBError> {
        let removed = self
            .users
            .remove(&user)
            .ok_or(DBError::InvalidUserID(user))?;
        self.requests.retain(|_id, request| !request.involves(user));
        Ok(removed)
    }

    pub fn get_request(&self, request: RequestID) -> Result<&DonationRequest, DBError> {
        self.requests
            .get(&request)
            .ok_or(DBError::InvalidRequestID(request))
    }

    pub fn get_request_mut(&mut self, request: RequestID) -> Result<&mut DonationRequest, DBError> {
        self.requests
            .get_mut(&request)
            .ok_or(DBError::InvalidRequestID(request))
    }

    pub fn store_request(&mut self, request: DonationRequest) {
        self.requests.insert(request.id, request);
    }

    pub fn list_requests(&self) -> impl Iterator<Item = &DonationRequest> + '_ {
        self.requests.values()
    }
}
