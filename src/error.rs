use thiserror::Error;

/// Failures a user-initiated action reports back to the caller.
///
/// Filesystem and network problems travel as `anyhow::Error` with context;
/// these variants cover the cases a front end wants to match on.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Mods root not set")]
    ModsRootNotSet,
    #[error("Images root not set")]
    ImagesRootNotSet,
    #[error("Character name required")]
    CharacterRequired,
    #[error("Mod name required")]
    ModNameRequired,
    #[error("Invalid folder name: {0:?}")]
    InvalidName(String),
    #[error("Character not found: {0}")]
    CharacterNotFound(String),
    #[error("Mod not found: {character}/{name}")]
    ModNotFound { character: String, name: String },
    #[error("No updateUrl in mod.json")]
    MissingUpdateUrl,
    #[error("Unsupported data URL")]
    UnsupportedDataUrl,
    #[error("Unsupported archive format: {0}")]
    UnsupportedArchive(String),
}
