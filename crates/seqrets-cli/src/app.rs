//! Command dispatch and the secret / vault / instruction commands.
//!
//! Passwords and PINs are read from the environment variables named in the
//! `[secrets]` config section. Results go to `out` (stdout in the binary),
//! logs go to stderr.

use anyhow::{bail, Context, Result};
use std::io::{Read, Write};
use std::path::Path;
use zeroize::Zeroizing;

use seqrets_card::CardManager;
use seqrets_core::{generate_keyfile, generate_mnemonic, FileRecord, SecretPayload};
use seqrets_shamir::ShamirConfig;
use seqrets_vault::{
    create_share_set, restore_payload, EncryptedInstruction, ExportedVault, InstructionContent,
    VaultFile,
};

use crate::args::{
    Command, ConvertArgs, GenerateCommand, InstructionCommand, InstructionEncryptArgs, OpenArgs,
    RestoreArgs, SplitArgs, VaultCommand,
};
use crate::config::CliConfig;

const DEFAULT_FILE_TYPE: &str = "application/octet-stream";

pub struct App {
    pub(crate) config: CliConfig,
    pub(crate) cards: Option<CardManager>,
}

impl App {
    pub fn new(config: CliConfig) -> Self {
        Self {
            config,
            cards: None,
        }
    }

    /// Use this card manager instead of the configured backend.
    #[cfg(test)]
    pub fn with_cards(mut self, cards: CardManager) -> Self {
        self.cards = Some(cards);
        self
    }

    pub fn run(&mut self, command: Command, out: &mut dyn Write) -> Result<()> {
        match command {
            Command::Split(args) => self.split(&args, out),
            Command::Restore(args) => self.restore(&args, out),
            Command::Vault(VaultCommand::Encrypt(args)) => self.vault_encrypt(&args, out),
            Command::Vault(VaultCommand::Decrypt(args)) => self.vault_decrypt(&args, out),
            Command::Vault(VaultCommand::Info { path }) => self.vault_info(&path, out),
            Command::Vault(VaultCommand::Instructions(args)) => self.vault_instructions(&args, out),
            Command::Instruction(InstructionCommand::Encrypt(args)) => {
                self.instruction_encrypt(&args, out)
            }
            Command::Instruction(InstructionCommand::Decrypt(args)) => {
                self.instruction_decrypt(&args, out)
            }
            Command::Generate(GenerateCommand::Mnemonic { words }) => {
                self.generate_mnemonic(words, out)
            }
            Command::Generate(GenerateCommand::Keyfile { out: path }) => self.generate_keyfile(&path),
            Command::Card(card) => self.card(card, out),
        }
    }

    // ========================================================================
    // Secrets from the environment
    // ========================================================================

    pub(crate) fn password(&self) -> Result<Zeroizing<String>> {
        env_secret(&self.config.secrets.password_env, "share password")
    }

    pub(crate) fn vault_password(&self) -> Result<Zeroizing<String>> {
        env_secret(&self.config.secrets.vault_password_env, "vault password")
    }

    // ========================================================================
    // split / restore
    // ========================================================================

    fn split(&mut self, args: &SplitArgs, out: &mut dyn Write) -> Result<()> {
        let config = ShamirConfig::new(args.threshold, args.total);
        config.validate()?;

        let payload = match (&args.text, &args.file) {
            (Some(_), Some(_)) => bail!("Use either --text or --file, not both"),
            (None, Some(path)) => {
                let bytes = read_input(path)?;
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "secret".to_owned());
                SecretPayload::File(FileRecord::new(name, &bytes, DEFAULT_FILE_TYPE))
            }
            (text, None) => {
                let bytes = read_input(text.as_deref().unwrap_or(Path::new(STDIN)))?;
                let text = std::str::from_utf8(&bytes).context("Secret text is not UTF-8")?;
                let text = text.trim_end_matches(['\r', '\n']);
                anyhow::ensure!(!text.is_empty(), "Secret is empty");
                SecretPayload::text(text)
            }
        };

        let password = self.password()?;
        let keyfile = read_keyfile(args.keyfile.as_deref())?;
        let set = create_share_set(&payload, &password, keyfile.as_deref().map(Vec::as_slice), config)
            .context("Failed to create shares")?;

        for share in set.to_strings() {
            writeln!(out, "{}", share)?;
        }

        if let Some(vault_path) = &args.vault {
            let instructions = args
                .instructions
                .as_deref()
                .map(|path| -> Result<EncryptedInstruction> {
                    let json = read_text(path)?;
                    Ok(EncryptedInstruction::from_json(&json)?)
                })
                .transpose()?;
            let label = args
                .label
                .as_deref()
                .unwrap_or(self.config.vault.default_label.as_str());
            let vault = ExportedVault::from_share_set(&set, label, keyfile.is_some(), instructions);

            let json = if args.encrypt {
                vault.encrypt(&self.vault_password()?)?.to_json()?
            } else {
                vault.to_json()?
            };
            std::fs::write(vault_path, json)
                .with_context(|| format!("Failed to write vault to {}", vault_path.display()))?;
            log::info!(
                "wrote vault {:?} ({}) to {}",
                vault.label,
                vault.set_id,
                vault_path.display()
            );
        }
        Ok(())
    }

    fn restore(&mut self, args: &RestoreArgs, out: &mut dyn Write) -> Result<()> {
        let mut shares: Vec<String> = Vec::new();

        if let Some(path) = &args.vault {
            let vault = self.open_vault_file(path)?;
            shares.extend(vault.shares);
        }
        if args.shares.is_empty() && shares.is_empty() {
            shares.extend(share_lines(&read_text(Path::new(STDIN))?));
        }
        for source in &args.shares {
            shares.extend(share_lines(&read_text(source)?));
        }
        log::debug!("restoring from {} share strings", shares.len());

        let password = self.password()?;
        let keyfile = read_keyfile(args.keyfile.as_deref())?;
        let payload = restore_payload(&shares, &password, keyfile.as_deref().map(Vec::as_slice))?;

        match payload {
            SecretPayload::Text(payload) => {
                let mut text = seqrets_core::expand(&payload)?;
                text.push('\n');
                write_output(args.out.as_deref(), out, text.as_bytes())
            }
            SecretPayload::File(record) => {
                let Some(path) = &args.out else {
                    bail!(
                        "The shares hold the file {:?}; pass --out to write it",
                        record.file_name
                    );
                };
                std::fs::write(path, record.content()?.as_slice())
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                log::info!("restored {} to {}", record.file_name, path.display());
                Ok(())
            }
        }
    }

    // ========================================================================
    // vault files
    // ========================================================================

    /// Read a vault file, decrypting it when it is encrypted.
    fn open_vault_file(&self, path: &Path) -> Result<ExportedVault> {
        let json = read_text(path)?;
        let vault = match VaultFile::parse(&json)? {
            VaultFile::Plain(vault) => vault,
            VaultFile::Encrypted(file) => file.open(&self.vault_password()?)?,
        };
        Ok(vault)
    }

    fn vault_encrypt(&mut self, args: &ConvertArgs, out: &mut dyn Write) -> Result<()> {
        let vault = match VaultFile::parse(&read_text(&args.path)?)? {
            VaultFile::Plain(vault) => vault,
            VaultFile::Encrypted(_) => bail!("{} is already encrypted", args.path.display()),
        };
        let json = vault.encrypt(&self.vault_password()?)?.to_json()?;
        write_output(args.out.as_deref(), out, json.as_bytes())
    }

    fn vault_decrypt(&mut self, args: &ConvertArgs, out: &mut dyn Write) -> Result<()> {
        let file = match VaultFile::parse(&read_text(&args.path)?)? {
            VaultFile::Encrypted(file) => file,
            VaultFile::Plain(_) => bail!("{} is not encrypted", args.path.display()),
        };
        let json = file.open_json(&self.vault_password()?)?;
        write_output(args.out.as_deref(), out, json.as_bytes())
    }

    fn vault_info(&mut self, path: &Path, out: &mut dyn Write) -> Result<()> {
        let vault = self.open_vault_file(path)?;
        let set = vault.share_set()?;

        writeln!(out, "Label:        {}", vault.label)?;
        writeln!(out, "Set ID:       {}", set.set_id())?;
        writeln!(
            out,
            "Shares:       {} of {} needed, {} included",
            set.threshold(),
            set.total(),
            set.shares().len()
        )?;
        writeln!(out, "Created:      {}", vault.created_at)?;
        writeln!(out, "Keyfile used: {}", vault.keyfile_used)?;
        writeln!(
            out,
            "Instructions: {}",
            vault.encrypted_instructions.is_some()
        )?;
        Ok(())
    }

    fn vault_instructions(&mut self, args: &OpenArgs, out: &mut dyn Write) -> Result<()> {
        let vault = self.open_vault_file(&args.path)?;
        let instruction = vault
            .encrypted_instructions
            .with_context(|| format!("{} carries no instructions", args.path.display()))?;
        self.write_instruction(&instruction, args, out)
    }

    // ========================================================================
    // instructions
    // ========================================================================

    fn instruction_encrypt(&mut self, args: &InstructionEncryptArgs, out: &mut dyn Write) -> Result<()> {
        let bytes = read_input(&args.path)?;

        let record = if args.plan {
            let plan: serde_json::Value =
                serde_json::from_slice(&bytes).context("Plan is not valid JSON")?;
            InstructionContent::plan_record(&plan)?
        } else {
            let name = args
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "instructions".to_owned());
            let file_type = args.file_type.as_deref().unwrap_or(DEFAULT_FILE_TYPE);
            FileRecord::new(name, &bytes, file_type)
        };

        let password = self.password()?;
        let keyfile = read_keyfile(args.keyfile.as_deref())?;
        let encrypted =
            EncryptedInstruction::encrypt(&record, &password, keyfile.as_deref().map(Vec::as_slice))?;
        log::info!("encrypted instruction {:?}", record.file_name);
        write_output(args.out.as_deref(), out, encrypted.to_json()?.as_bytes())
    }

    fn instruction_decrypt(&mut self, args: &OpenArgs, out: &mut dyn Write) -> Result<()> {
        let instruction = EncryptedInstruction::from_json(&read_text(&args.path)?)?;
        self.write_instruction(&instruction, args, out)
    }

    fn write_instruction(
        &self,
        instruction: &EncryptedInstruction,
        args: &OpenArgs,
        out: &mut dyn Write,
    ) -> Result<()> {
        let password = self.password()?;
        let keyfile = read_keyfile(args.keyfile.as_deref())?;
        match instruction.open(&password, keyfile.as_deref().map(Vec::as_slice))? {
            InstructionContent::Plan(plan) => {
                let json = Zeroizing::new(serde_json::to_string_pretty(&plan)?);
                write_output(args.out.as_deref(), out, json.as_bytes())
            }
            InstructionContent::File(record) => {
                let Some(path) = &args.out else {
                    bail!(
                        "The instruction is the file {:?} ({}); pass --out to write it",
                        record.file_name,
                        record.file_type
                    );
                };
                std::fs::write(path, record.content()?.as_slice())
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                log::info!(
                    "wrote instruction file {:?} to {}",
                    record.file_name,
                    path.display()
                );
                Ok(())
            }
        }
    }

    // ========================================================================
    // generate
    // ========================================================================

    fn generate_mnemonic(&mut self, words: usize, out: &mut dyn Write) -> Result<()> {
        let mnemonic = generate_mnemonic(words)?;
        let phrase = Zeroizing::new(mnemonic.to_string());
        writeln!(out, "{}", phrase.as_str())?;
        Ok(())
    }

    fn generate_keyfile(&mut self, path: &Path) -> Result<()> {
        anyhow::ensure!(
            !path.exists(),
            "{} already exists; refusing to overwrite a keyfile",
            path.display()
        );
        let keyfile = generate_keyfile();
        std::fs::write(path, keyfile.as_slice())
            .with_context(|| format!("Failed to write keyfile to {}", path.display()))?;
        log::info!("wrote {} byte keyfile to {}", keyfile.len(), path.display());
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Input path that means stdin
const STDIN: &str = "-";

pub(crate) fn env_secret(name: &str, what: &str) -> Result<Zeroizing<String>> {
    let value = Zeroizing::new(
        std::env::var(name).with_context(|| format!("Set {} to the {}", name, what))?,
    );
    anyhow::ensure!(!value.is_empty(), "{} is empty", name);
    Ok(value)
}

pub(crate) fn optional_env_secret(name: &str) -> Option<Zeroizing<String>> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .map(Zeroizing::new)
}

/// File contents, or stdin for `-`.
pub(crate) fn read_input(path: &Path) -> Result<Zeroizing<Vec<u8>>> {
    let mut bytes = Zeroizing::new(Vec::new());
    if path.as_os_str() == STDIN {
        std::io::stdin()
            .read_to_end(&mut bytes)
            .context("Failed to read stdin")?;
    } else {
        std::fs::File::open(path)
            .and_then(|mut f| f.read_to_end(&mut bytes))
            .with_context(|| format!("Failed to read {}", path.display()))?;
    }
    Ok(bytes)
}

pub(crate) fn read_text(path: &Path) -> Result<Zeroizing<String>> {
    let bytes = read_input(path)?;
    let text = std::str::from_utf8(&bytes)
        .with_context(|| format!("{} is not UTF-8", path.display()))?;
    Ok(Zeroizing::new(text.to_owned()))
}

fn read_keyfile(path: Option<&Path>) -> Result<Option<Zeroizing<Vec<u8>>>> {
    path.map(read_input).transpose()
}

/// Non-empty trimmed lines
fn share_lines(text: &str) -> impl Iterator<Item = String> + '_ {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
}

/// Write to `path` when given, else to `out`.
pub(crate) fn write_output(path: Option<&Path>, out: &mut dyn Write, bytes: &[u8]) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            log::info!("wrote {} bytes to {}", bytes.len(), path.display());
        }
        None => {
            out.write_all(bytes)?;
            if !bytes.ends_with(b"\n") {
                out.write_all(b"\n")?;
            }
        }
    }
    Ok(())
}
