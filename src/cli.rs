use crate::{
    app::ModManager,
    database::{ModEntryPatch, NewModEntry},
    images,
    library::ModItem,
    metadata::ModMetaPatch,
};
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "json" => Some(OutputFormat::Json),
            "text" => Some(OutputFormat::Text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Quiet,
    Verbose,
    Debug,
}

impl Verbosity {
    pub fn filter(self) -> &'static str {
        match self {
            Verbosity::Quiet => "warn",
            Verbosity::Verbose => "info",
            Verbosity::Debug => "debug",
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct GlobalOptions {
    format: OutputFormat,
    verbosity: Verbosity,
}

#[derive(Debug, PartialEq, Eq)]
enum CliCommand {
    Paths,
    SetModsRoot(PathBuf),
    SetImagesRoot(PathBuf),
    Characters,
    CharacterAdd(String),
    CharacterDelete(String),
    CharacterInfo(String),
    CharacterImage {
        character: String,
        source: String,
    },
    Mods(String),
    ModAdd {
        character: String,
        archive: PathBuf,
        name: Option<String>,
        patch: ModMetaPatch,
    },
    ModImport {
        character: String,
        archive: PathBuf,
    },
    ModDelete(ModRef),
    ModEnable(ModRef),
    ModDisable(ModRef),
    ModActivate(ModRef),
    ModUpdate(ModRef),
    ModEdit {
        target: ModRef,
        patch: ModMetaPatch,
    },
    ModImage {
        target: ModRef,
        source: String,
    },
    ModOpen(ModRef),
    ModPage(ModRef),
    ModLink {
        target: ModRef,
        patch: ModEntryPatch,
    },
    ModEntryAdd {
        target: ModRef,
        entry: NewModEntry,
        image: Option<String>,
    },
    Open(Option<String>),
    Help,
    Version,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ModRef {
    character: String,
    name: String,
}

/// Verbosity requested on the command line, needed before logging starts.
pub fn verbosity(args: &[String]) -> Verbosity {
    parse_global_options(args).0.verbosity
}

pub fn run(args: &[String]) -> Result<()> {
    let (global, tokens) = parse_global_options(args);
    let command = parse_command(&tokens)?;
    match command {
        CliCommand::Help => {
            print_help();
            Ok(())
        }
        CliCommand::Version => {
            println!("syleaf v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        command => {
            let mut manager = ModManager::initialize()?;
            run_command(&mut manager, command, global.format)
        }
    }
}

fn parse_global_options(args: &[String]) -> (GlobalOptions, Vec<String>) {
    let mut format = OutputFormat::Text;
    let mut verbosity = Verbosity::Quiet;
    let mut tokens = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if let Some(value) = arg.strip_prefix("--format=") {
            if let Some(parsed) = OutputFormat::parse(value) {
                format = parsed;
            }
            continue;
        }
        if arg == "--format" {
            if let Some(value) = iter.next() {
                if let Some(parsed) = OutputFormat::parse(value) {
                    format = parsed;
                }
            }
            continue;
        }
        if arg == "--verbose" {
            verbosity = verbosity.max(Verbosity::Verbose);
            continue;
        }
        if arg.len() > 1 && arg.starts_with('-') && !arg.starts_with("--") && arg[1..].chars().all(|ch| ch == 'v') {
            let count = arg.chars().filter(|ch| *ch == 'v').count();
            verbosity = if count >= 2 {
                Verbosity::Debug
            } else {
                verbosity.max(Verbosity::Verbose)
            };
            continue;
        }
        tokens.push(arg.to_string());
    }

    (GlobalOptions { format, verbosity }, tokens)
}

fn parse_command(tokens: &[String]) -> Result<CliCommand> {
    let Some(head) = tokens.first() else {
        return Ok(CliCommand::Help);
    };
    let rest = tokens.get(1..).unwrap_or(&[]);
    match head.as_str() {
        "help" | "--help" | "-h" => Ok(CliCommand::Help),
        "version" | "--version" | "-V" => Ok(CliCommand::Version),
        "paths" => Ok(CliCommand::Paths),
        "set-mods-root" => Ok(CliCommand::SetModsRoot(PathBuf::from(required(
            rest,
            0,
            "set-mods-root requires a path",
        )?))),
        "set-images-root" => Ok(CliCommand::SetImagesRoot(PathBuf::from(required(
            rest,
            0,
            "set-images-root requires a path",
        )?))),
        "characters" => Ok(CliCommand::Characters),
        "character" => parse_character(rest),
        "mods" => Ok(CliCommand::Mods(
            required(rest, 0, "mods requires a character")?.to_string(),
        )),
        "mod" => parse_mod(rest),
        "open" => Ok(CliCommand::Open(rest.first().cloned())),
        other => bail!("Unknown command: {other} (see 'syleaf help')"),
    }
}

fn required<'a>(args: &'a [String], index: usize, message: &str) -> Result<&'a str> {
    args.get(index)
        .map(|value| value.as_str())
        .ok_or_else(|| anyhow::anyhow!("{message}"))
}

fn parse_character(args: &[String]) -> Result<CliCommand> {
    let sub = required(args, 0, "character requires add, delete, info or image")?;
    let name = required(args, 1, "character name required")?.to_string();
    match sub {
        "add" => Ok(CliCommand::CharacterAdd(name)),
        "delete" | "rm" => Ok(CliCommand::CharacterDelete(name)),
        "info" => Ok(CliCommand::CharacterInfo(name)),
        "image" => Ok(CliCommand::CharacterImage {
            character: name,
            source: required(args, 2, "image source required (url, data URL or file)")?.to_string(),
        }),
        _ => bail!("Unknown character command: {sub}"),
    }
}

fn parse_mod_ref(args: &[String]) -> Result<ModRef> {
    Ok(ModRef {
        character: required(args, 0, "character name required")?.to_string(),
        name: required(args, 1, "mod name required")?.to_string(),
    })
}

fn parse_mod(args: &[String]) -> Result<CliCommand> {
    let sub = required(args, 0, "mod requires a subcommand")?;
    let rest = args.get(1..).unwrap_or(&[]);
    match sub {
        "add" => {
            let character = required(rest, 0, "character name required")?.to_string();
            let archive = PathBuf::from(required(rest, 1, "archive path required")?);
            let (name, patch) = parse_meta_flags(rest.get(2..).unwrap_or(&[]))?;
            Ok(CliCommand::ModAdd {
                character,
                archive,
                name,
                patch,
            })
        }
        "import" => Ok(CliCommand::ModImport {
            character: required(rest, 0, "character name required")?.to_string(),
            archive: PathBuf::from(required(rest, 1, "archive path required")?),
        }),
        "delete" | "rm" => Ok(CliCommand::ModDelete(parse_mod_ref(rest)?)),
        "enable" => Ok(CliCommand::ModEnable(parse_mod_ref(rest)?)),
        "disable" => Ok(CliCommand::ModDisable(parse_mod_ref(rest)?)),
        "activate" => Ok(CliCommand::ModActivate(parse_mod_ref(rest)?)),
        "update" => Ok(CliCommand::ModUpdate(parse_mod_ref(rest)?)),
        "edit" => {
            let target = parse_mod_ref(rest)?;
            let (name, patch) = parse_meta_flags(rest.get(2..).unwrap_or(&[]))?;
            Ok(CliCommand::ModEdit {
                target,
                patch: ModMetaPatch { name, ..patch },
            })
        }
        "image" => {
            let target = parse_mod_ref(rest)?;
            let source = required(rest, 2, "image source required (url, data URL or file)")?;
            Ok(CliCommand::ModImage {
                target,
                source: source.to_string(),
            })
        }
        "open" => Ok(CliCommand::ModOpen(parse_mod_ref(rest)?)),
        "page" => Ok(CliCommand::ModPage(parse_mod_ref(rest)?)),
        "link" => {
            let target = parse_mod_ref(rest)?;
            let links = parse_link_flags(rest.get(2..).unwrap_or(&[]), false)?;
            Ok(CliCommand::ModLink {
                target,
                patch: ModEntryPatch {
                    page_url: links.page_url,
                    image_url: links.image_url,
                },
            })
        }
        "entry" => {
            let target = parse_mod_ref(rest)?;
            let links = parse_link_flags(rest.get(2..).unwrap_or(&[]), true)?;
            Ok(CliCommand::ModEntryAdd {
                target,
                entry: NewModEntry {
                    page_url: links.page_url,
                    image_url: links.image_url,
                    data_url: None,
                },
                image: links.image,
            })
        }
        _ => bail!("Unknown mod command: {sub}"),
    }
}

/// `--name`, `--version`, `--author`, `--description`, `--page-url`, `--update-url`.
fn parse_meta_flags(args: &[String]) -> Result<(Option<String>, ModMetaPatch)> {
    let mut name = None;
    let mut patch = ModMetaPatch::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag, Some(value.to_string())),
            _ => (arg.as_str(), None),
        };
        let slot = match flag {
            "--name" => &mut name,
            "--version" => &mut patch.version,
            "--author" => &mut patch.author,
            "--description" => &mut patch.description,
            "--page-url" => &mut patch.page_url,
            "--update-url" => &mut patch.update_url,
            _ => bail!("Unknown option: {arg}"),
        };
        let value = match inline {
            Some(value) => value,
            None => match iter.next() {
                Some(value) => value.to_string(),
                None => bail!("{flag} requires a value"),
            },
        };
        *slot = Some(value);
    }
    Ok((name, patch))
}

#[derive(Debug, Default)]
struct LinkFlags {
    page_url: Option<String>,
    image_url: Option<String>,
    image: Option<String>,
}

/// `--page-url`, `--image-url`, and `--image` when `allow_image` is set.
fn parse_link_flags(args: &[String], allow_image: bool) -> Result<LinkFlags> {
    let mut flags = LinkFlags::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag, Some(value.to_string())),
            _ => (arg.as_str(), None),
        };
        let slot = match flag {
            "--page-url" => &mut flags.page_url,
            "--image-url" => &mut flags.image_url,
            "--image" if allow_image => &mut flags.image,
            _ => bail!("Unknown option: {arg}"),
        };
        *slot = Some(match inline.or_else(|| iter.next().cloned()) {
            Some(value) => value,
            None => bail!("{flag} requires a value"),
        });
    }
    Ok(flags)
}

fn run_command(manager: &mut ModManager, command: CliCommand, format: OutputFormat) -> Result<()> {
    match command {
        CliCommand::Paths => list_paths(manager, format),
        CliCommand::SetModsRoot(path) => {
            let path = absolute(&path)?;
            manager.set_mods_root(path.clone())?;
            println!("Mods root: {}", path.display());
            Ok(())
        }
        CliCommand::SetImagesRoot(path) => {
            let path = absolute(&path)?;
            manager.set_images_root(path.clone())?;
            println!("Images root: {}", path.display());
            Ok(())
        }
        CliCommand::Characters => list_characters(manager, format),
        CliCommand::CharacterAdd(name) => {
            let name = manager.add_character(&name)?;
            println!("Added character {name}");
            Ok(())
        }
        CliCommand::CharacterDelete(name) => {
            manager.delete_character(&name)?;
            println!("Deleted character {}", name.trim());
            Ok(())
        }
        CliCommand::CharacterInfo(name) => show_character(manager, &name, format),
        CliCommand::CharacterImage { character, source } => {
            let path = set_character_image(manager, &character, &source)?;
            println!("Saved {}", path.display());
            Ok(())
        }
        CliCommand::Mods(character) => list_mods(manager, &character, format),
        CliCommand::ModAdd {
            character,
            archive,
            name,
            patch,
        } => {
            let mod_name = match name {
                Some(name) => name,
                None => archive_stem(&archive)?,
            };
            let meta = manager.add_mod_from_archive(&character, &archive, &mod_name, patch)?;
            println!("Added {} to {}", meta.name, character.trim());
            Ok(())
        }
        CliCommand::ModImport { character, archive } => {
            let copied = manager.copy_archive_to_mod_folder(&character, &archive)?;
            println!("Copied {} into {}", copied.file_name, copied.dir.display());
            Ok(())
        }
        CliCommand::ModDelete(target) => {
            manager.delete_mod(&target.character, &target.name)?;
            println!("Deleted {}/{}", target.character, target.name);
            Ok(())
        }
        CliCommand::ModEnable(target) => {
            manager.set_enabled(&target.character, &target.name, true)?;
            println!("Enabled {}/{}", target.character, target.name);
            Ok(())
        }
        CliCommand::ModDisable(target) => {
            manager.set_enabled(&target.character, &target.name, false)?;
            println!("Disabled {}/{}", target.character, target.name);
            Ok(())
        }
        CliCommand::ModActivate(target) => {
            manager.activate_exclusive(&target.character, &target.name)?;
            println!("Activated {}/{}", target.character, target.name);
            Ok(())
        }
        CliCommand::ModUpdate(target) => {
            let meta = manager.update_from_url(&target.character, &target.name)?;
            println!(
                "Updated {}/{} ({})",
                target.character,
                target.name,
                meta.updated_at.as_deref().unwrap_or("-")
            );
            Ok(())
        }
        CliCommand::ModEdit { target, patch } => {
            let meta = manager.save_metadata(&target.character, &target.name, patch)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&meta)?),
                OutputFormat::Text => println!("Saved {}/{}", target.character, target.name),
            }
            Ok(())
        }
        CliCommand::ModImage { target, source } => {
            let file = set_mod_image(manager, &target, &source)?;
            println!("Saved {file} for {}/{}", target.character, target.name);
            Ok(())
        }
        CliCommand::ModOpen(target) => {
            manager.open_folder(Some(&target.character), Some(&target.name))?;
            Ok(())
        }
        CliCommand::ModPage(target) => {
            if !manager.open_mod_page(&target.character, &target.name)? {
                println!("{}/{} has no pageUrl", target.character, target.name);
            }
            Ok(())
        }
        CliCommand::ModLink { target, patch } => {
            if patch != ModEntryPatch::default() {
                manager.update_mod_entry(&target.character, &target.name, patch)?;
            }
            let entry = manager.mod_entry(&target.character, &target.name)?;
            match (format, entry) {
                (OutputFormat::Json, entry) => println!("{}", serde_json::to_string_pretty(&entry)?),
                (OutputFormat::Text, None) => {
                    println!("{}/{} has no database entry", target.character, target.name)
                }
                (OutputFormat::Text, Some(entry)) => {
                    println!("Page:  {}", entry.page_url.as_deref().unwrap_or("-"));
                    println!("Image: {}", entry.image_url.as_deref().unwrap_or("-"));
                    if let Some(file) = entry.image_file {
                        println!("File:  {file}");
                    }
                }
            }
            Ok(())
        }
        CliCommand::ModEntryAdd {
            target,
            mut entry,
            image,
        } => {
            if let Some(source) = image {
                apply_entry_image(&mut entry, &source)?;
            }
            let added = manager.add_mod_entry(&target.character, &target.name, entry)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&added)?),
                OutputFormat::Text => println!(
                    "Added entry {} for {}/{}{}",
                    added.index,
                    target.character,
                    target.name,
                    added
                        .image_file
                        .map(|file| format!(" ({file})"))
                        .unwrap_or_default()
                ),
            }
            Ok(())
        }
        CliCommand::Open(character) => {
            manager.open_folder(character.as_deref(), None)?;
            Ok(())
        }
        CliCommand::Help | CliCommand::Version => Ok(()),
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()
        .context("resolve current dir")?
        .join(path))
}

fn archive_stem(archive: &Path) -> Result<String> {
    let file_name = archive
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .context("archive file name")?;
    Ok(crate::archive::strip_archive_extension(&file_name).to_string())
}

fn set_mod_image(manager: &mut ModManager, target: &ModRef, source: &str) -> Result<String> {
    if source.starts_with("data:") {
        return manager.save_mod_image_from_data_url(&target.character, &target.name, source);
    }
    if source.starts_with("http://") || source.starts_with("https://") {
        return manager.save_mod_image_from_url(&target.character, &target.name, source);
    }
    let image = images::PreviewImage::read(Path::new(source))?;
    manager.save_mod_image_from_data_url(&target.character, &target.name, &image.to_data_url())
}

/// `--image` takes a URL, a data URL or a local file.
fn apply_entry_image(entry: &mut NewModEntry, source: &str) -> Result<()> {
    if source.starts_with("data:") {
        entry.data_url = Some(source.to_string());
    } else if source.starts_with("http://") || source.starts_with("https://") {
        entry.image_url = Some(source.to_string());
    } else {
        entry.data_url = Some(images::PreviewImage::read(Path::new(source))?.to_data_url());
    }
    Ok(())
}

fn set_character_image(manager: &mut ModManager, character: &str, source: &str) -> Result<PathBuf> {
    if source.starts_with("http://") || source.starts_with("https://") {
        return manager.save_character_image_from_url(character, source);
    }
    let data_url = if source.starts_with("data:") {
        source.to_string()
    } else {
        images::PreviewImage::read(Path::new(source))?.to_data_url()
    };
    manager.save_character_image_from_data_url(character, &data_url)
}

fn show_character(manager: &ModManager, character: &str, format: OutputFormat) -> Result<()> {
    let info = manager.character_info(character)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&info)?),
        OutputFormat::Text => {
            let image = info.image_path.as_ref().map(|path| path.display().to_string());
            println!("Image: {}", image.as_deref().unwrap_or("(none)"));
            println!("Url:   {}", info.url.as_deref().unwrap_or("-"));
        }
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PathsOutput {
    settings: String,
    mods_root: Option<String>,
    images_root: Option<String>,
}

fn list_paths(manager: &ModManager, format: OutputFormat) -> Result<()> {
    let display = |path: &Option<PathBuf>| path.as_ref().map(|p| p.display().to_string());
    let output = PathsOutput {
        settings: manager.settings_path().display().to_string(),
        mods_root: display(&manager.settings.mods_root),
        images_root: display(&manager.settings.images_root),
    };

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            println!("Settings: {}", output.settings);
            println!(
                "Mods root: {}",
                output.mods_root.as_deref().unwrap_or("(not set)")
            );
            println!(
                "Images root: {}",
                output.images_root.as_deref().unwrap_or("(not set)")
            );
        }
    }

    Ok(())
}

fn list_characters(manager: &mut ModManager, format: OutputFormat) -> Result<()> {
    let characters = manager.refresh_characters()?;
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&characters)?);
        }
        OutputFormat::Text => {
            for character in characters {
                let marker = if character.image_path.is_some() { "*" } else { " " };
                println!("{marker} {}", character.name);
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ModListItem {
    folder: String,
    name: String,
    internal_name: Option<String>,
    enabled: bool,
    version: Option<String>,
    author: Option<String>,
    link: Option<String>,
    has_preview: bool,
    updated_at: Option<String>,
}

fn list_mods(manager: &mut ModManager, character: &str, format: OutputFormat) -> Result<()> {
    let snapshot = manager.load_collection_blocking(character)?;
    let items: Vec<ModListItem> = snapshot
        .items
        .iter()
        .map(|item: &ModItem| ModListItem {
            folder: item.folder.clone(),
            name: item.display_name().to_string(),
            internal_name: snapshot.names.get(&item.key).cloned(),
            enabled: item.meta.is_enabled(),
            version: item.meta.version.clone(),
            author: item.meta.author.clone(),
            link: snapshot.links.get(&item.key).cloned(),
            has_preview: snapshot.images.contains_key(&item.key),
            updated_at: item.meta.updated_at.clone(),
        })
        .collect();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        OutputFormat::Text => {
            for item in items {
                let enabled = if item.enabled { "x" } else { " " };
                let preview = if item.has_preview { "img" } else { "   " };
                let internal = item
                    .internal_name
                    .map(|name| format!(" ({name})"))
                    .unwrap_or_default();
                let version = item.version.unwrap_or_else(|| "-".to_string());
                println!(
                    "[{enabled}] {preview} {version:<8} {name}{internal}",
                    name = item.name
                );
                if let Some(link) = item.link {
                    println!("          {link}");
                }
            }
        }
    }
    Ok(())
}

fn print_help() {
    println!("syleaf v{}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  syleaf paths                              Show settings and roots");
    println!("  syleaf set-mods-root <path>               Set the mods root");
    println!("  syleaf set-images-root <path>             Set the character images root");
    println!("  syleaf characters                         List characters");
    println!("  syleaf character add|delete <name>        Create or remove a character");
    println!("  syleaf character info <name>              Show the character image and url");
    println!("  syleaf character image <name> <src>       Set the character image");
    println!("  syleaf mods <character>                   List a character's mods");
    println!("  syleaf mod add <character> <archive>      Extract an archive as a new mod");
    println!("  syleaf mod import <character> <archive>   Copy an archive into a new mod folder");
    println!("  syleaf mod delete <character> <mod>       Delete a mod");
    println!("  syleaf mod enable|disable <character> <mod>");
    println!("  syleaf mod activate <character> <mod>     Enable one mod, disable the rest");
    println!("  syleaf mod update <character> <mod>       Re-download from updateUrl");
    println!("  syleaf mod edit <character> <mod>         Edit mod.json fields");
    println!("  syleaf mod image <character> <mod> <src>  Set preview from URL, data URL or file");
    println!("  syleaf mod open <character> <mod>         Open the mod folder");
    println!("  syleaf mod page <character> <mod>         Open the mod's pageUrl");
    println!("  syleaf mod link <character> <mod>         Show or set the database entry links");
    println!("  syleaf mod entry <character> <mod>        Append a database entry");
    println!("  syleaf open [character]                   Open the mods root or a character");
    println!();
    println!("Metadata options (mod add / mod edit):");
    println!("  --name, --version, --author, --description, --page-url, --update-url");
    println!();
    println!("Link options (mod link / mod entry):");
    println!("  --page-url, --image-url, --image <url|data URL|file> (entry only)");
    println!();
    println!("Global options:");
    println!("  --format <json|text>                      Output format");
    println!("  -v, -vv                                   Log info / debug (or SYLEAF_LOG)");
    println!("  -h, --help                                Show help");
    println!("  -V, --version                             Show version");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn global_options_are_stripped() {
        let (global, tokens) =
            parse_global_options(&args(&["--format", "json", "-vv", "mods", "Ellen"]));
        assert_eq!(global.format, OutputFormat::Json);
        assert_eq!(global.verbosity, Verbosity::Debug);
        assert_eq!(tokens, args(&["mods", "Ellen"]));
        assert_eq!(verbosity(&args(&["-v", "paths"])), Verbosity::Verbose);
        assert_eq!(verbosity(&args(&["paths"])).filter(), "warn");
    }

    #[test]
    fn mod_subcommands_parse() {
        assert_eq!(
            parse_command(&args(&["mod", "enable", "Ellen", "Maid"])).unwrap(),
            CliCommand::ModEnable(ModRef {
                character: "Ellen".to_string(),
                name: "Maid".to_string(),
            })
        );
        let edit = parse_command(&args(&[
            "mod",
            "edit",
            "Ellen",
            "Maid",
            "--author=Zed",
            "--page-url",
            "https://example.com",
        ]))
        .unwrap();
        let CliCommand::ModEdit { patch, .. } = edit else {
            panic!("expected edit");
        };
        assert_eq!(patch.author.as_deref(), Some("Zed"));
        assert_eq!(patch.page_url.as_deref(), Some("https://example.com"));
    }

    #[test]
    fn bad_input_is_rejected() {
        assert!(parse_command(&args(&["mod", "enable", "Ellen"])).is_err());
        assert!(parse_command(&args(&["frobnicate"])).is_err());
        assert!(parse_command(&args(&["mod", "edit", "A", "B", "--colour", "x"])).is_err());
        assert_eq!(parse_command(&[]).unwrap(), CliCommand::Help);
    }

    #[test]
    fn database_subcommands_parse() {
        assert_eq!(
            parse_command(&args(&["character", "info", "Ellen"])).unwrap(),
            CliCommand::CharacterInfo("Ellen".to_string())
        );
        assert_eq!(
            parse_command(&args(&["character", "image", "Ellen", "ellen.png"])).unwrap(),
            CliCommand::CharacterImage {
                character: "Ellen".to_string(),
                source: "ellen.png".to_string(),
            }
        );
        assert!(parse_command(&args(&["character", "image", "Ellen"])).is_err());

        let maid = ModRef {
            character: "Ellen".to_string(),
            name: "Maid".to_string(),
        };
        assert_eq!(
            parse_command(&args(&["mod", "link", "Ellen", "Maid", "--page-url=https://p", "--image-url", ""]))
                .unwrap(),
            CliCommand::ModLink {
                target: maid.clone(),
                patch: ModEntryPatch {
                    page_url: Some("https://p".to_string()),
                    image_url: Some(String::new()),
                },
            }
        );
        assert_eq!(
            parse_command(&args(&["mod", "entry", "Ellen", "Maid", "--image", "shot.webp"])).unwrap(),
            CliCommand::ModEntryAdd {
                target: maid,
                entry: NewModEntry::default(),
                image: Some("shot.webp".to_string()),
            }
        );
        assert!(parse_command(&args(&["mod", "link", "Ellen", "Maid", "--image", "x"])).is_err());
        assert!(parse_command(&args(&["mod", "entry", "Ellen", "Maid", "--page-url"])).is_err());
    }

    #[test]
    fn entry_images_route_by_source() {
        let mut entry = NewModEntry::default();
        apply_entry_image(&mut entry, "https://cdn.test/a.png").unwrap();
        assert_eq!(entry.image_url.as_deref(), Some("https://cdn.test/a.png"));
        assert_eq!(entry.data_url, None);

        apply_entry_image(&mut entry, "data:image/png;base64,iVBORw0=").unwrap();
        assert_eq!(entry.data_url.as_deref(), Some("data:image/png;base64,iVBORw0="));
        assert!(apply_entry_image(&mut entry, "/no/such/file.png").is_err());
    }

    #[test]
    fn paths_serialize_in_camel_case() {
        let output = PathsOutput {
            settings: "s.json".to_string(),
            mods_root: Some("/m".to_string()),
            images_root: None,
        };
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["modsRoot"], "/m");
        assert!(value.get("imagesRoot").is_some());
        assert!(value.get("mods_root").is_none());
    }
}
