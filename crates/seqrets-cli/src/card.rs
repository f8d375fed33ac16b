//! `seqrets card ...`: smart card commands.

use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::Path;
use zeroize::Zeroizing;

use seqrets_card::{
    CancelToken, CardItem, CardManager, ItemKind, SimulatedApplet, SimulatedBackend,
};
use seqrets_shamir::Qard;
use seqrets_vault::{EncryptedInstruction, VaultFile};

use crate::app::{env_secret, optional_env_secret, read_input, read_text, App};
use crate::args::{CardCommand, ReaderArg};
use crate::config::{CliConfig, BACKEND_PCSC, BACKEND_SIMULATOR};

/// Readers offered by the `simulator` backend, each holding a blank card
pub const SIMULATOR_READERS: [&str; 2] = ["Simulated Reader 0", "Simulated Reader 1"];

/// Build the card manager for the configured backend.
pub fn connect(config: &CliConfig) -> Result<CardManager> {
    match config.card.backend.as_str() {
        BACKEND_SIMULATOR => {
            let backend = SimulatedBackend::new();
            for reader in SIMULATOR_READERS {
                backend.insert_card(reader, SimulatedApplet::new());
            }
            log::warn!("using the card simulator; nothing is written to a real card");
            Ok(CardManager::new(backend))
        }
        #[cfg(feature = "pcsc")]
        BACKEND_PCSC => Ok(CardManager::new(seqrets_card::PcscBackend::establish()?)),
        #[cfg(not(feature = "pcsc"))]
        BACKEND_PCSC => bail!("This build has no PC/SC support; rebuild with --features pcsc"),
        other => bail!("Unknown card backend: {}", other),
    }
}

impl App {
    fn cards(&mut self) -> Result<&CardManager> {
        if self.cards.is_none() {
            self.cards = Some(connect(&self.config)?);
        }
        self.cards.as_ref().context("Card backend unavailable")
    }

    /// `--reader`, else `card.reader` from the config, else the first reader.
    fn reader(&mut self, arg: &ReaderArg) -> Result<String> {
        if let Some(reader) = &arg.reader {
            return Ok(reader.clone());
        }
        if !self.config.card.reader.is_empty() {
            return Ok(self.config.card.reader.clone());
        }
        let readers = self.cards()?.list_readers()?;
        readers
            .into_iter()
            .next()
            .context("No smart card reader found")
    }

    fn pin(&self) -> Option<Zeroizing<String>> {
        optional_env_secret(&self.config.secrets.pin_env)
    }

    fn new_pin(&self) -> Result<Zeroizing<String>> {
        env_secret(&self.config.secrets.new_pin_env, "new card PIN")
    }

    pub(crate) fn card(&mut self, command: CardCommand, out: &mut dyn Write) -> Result<()> {
        match command {
            CardCommand::List => self.card_list(out),
            CardCommand::Status(reader) => self.card_status(&reader, out),
            CardCommand::Read { reader, out_dir } => {
                self.card_read(&reader, out_dir.as_deref(), out)
            }
            CardCommand::Write {
                kind,
                path,
                label,
                reader,
            } => self.card_write(kind.into(), &path, label, &reader),
            CardCommand::Erase { item, reader } => self.card_erase(item, &reader),
            CardCommand::VerifyPin(reader) => self.card_verify_pin(&reader, out),
            CardCommand::SetPin(reader) => self.card_set_pin(&reader, out),
            CardCommand::ChangePin(reader) => self.card_change_pin(&reader, out),
            CardCommand::Clone { to, reader } => self.card_clone(&reader, &to, out),
        }
    }

    fn card_list(&mut self, out: &mut dyn Write) -> Result<()> {
        let readers = self.cards()?.list_readers()?;
        if readers.is_empty() {
            writeln!(out, "No readers found")?;
        }
        for reader in readers {
            writeln!(out, "{}", reader)?;
        }
        Ok(())
    }

    fn card_status(&mut self, arg: &ReaderArg, out: &mut dyn Write) -> Result<()> {
        let reader = self.reader(arg)?;
        let pin = self.pin();
        let status = self
            .cards()?
            .status(&reader, pin.as_deref().map(String::as_str), &CancelToken::new())?;
        writeln!(out, "{}", serde_json::to_string_pretty(&status)?)?;
        Ok(())
    }

    fn card_read(&mut self, arg: &ReaderArg, out_dir: Option<&Path>, out: &mut dyn Write) -> Result<()> {
        let reader = self.reader(arg)?;
        let pin = self.pin();
        let items = self
            .cards()?
            .read_items(&reader, pin.as_deref().map(String::as_str), &CancelToken::new())?;

        if items.is_empty() {
            writeln!(out, "Card is empty")?;
            return Ok(());
        }
        for (index, item) in items.iter().enumerate() {
            writeln!(
                out,
                "{}\t{}\t{}\t{} bytes",
                index,
                item.kind,
                item.label,
                item.payload.len()
            )?;
        }

        if let Some(dir) = out_dir {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            for (index, item) in items.iter().enumerate() {
                let path = dir.join(item_file_name(index, item));
                std::fs::write(&path, &item.payload)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
            log::info!("wrote {} items to {}", items.len(), dir.display());
        }
        Ok(())
    }

    fn card_write(
        &mut self,
        kind: ItemKind,
        path: &Path,
        label: Option<String>,
        arg: &ReaderArg,
    ) -> Result<()> {
        // Check the content is what it claims to be before it goes on a card
        let (payload, default_label) = match kind {
            ItemKind::Share => {
                let text = read_text(path)?;
                let qard = Qard::parse(&text)?;
                (
                    Zeroizing::new(text.trim().as_bytes().to_vec()),
                    format!("Share {}", qard.index()),
                )
            }
            ItemKind::Vault => {
                let text = read_text(path)?;
                VaultFile::parse(&text)?;
                (
                    Zeroizing::new(text.as_bytes().to_vec()),
                    self.config.vault.default_label.clone(),
                )
            }
            ItemKind::Instruction => {
                let text = read_text(path)?;
                EncryptedInstruction::from_json(&text)?;
                (Zeroizing::new(text.as_bytes().to_vec()), "Instructions".to_owned())
            }
            ItemKind::Keyfile => (read_input(path)?, "Keyfile".to_owned()),
        };
        let label = label.unwrap_or(default_label);

        let reader = self.reader(arg)?;
        let pin = self.pin();
        let item = CardItem::new(kind, &label, payload.to_vec());
        self.cards()?.write_item(
            &reader,
            item,
            pin.as_deref().map(String::as_str),
            &CancelToken::new(),
        )?;
        log::info!("stored {} {:?} on card in {}", kind, label, reader);
        Ok(())
    }

    fn card_erase(&mut self, item: Option<usize>, arg: &ReaderArg) -> Result<()> {
        let reader = self.reader(arg)?;
        let pin = self.pin();
        let pin = pin.as_deref().map(String::as_str);
        let cancel = CancelToken::new();

        match item {
            Some(index) => self.cards()?.erase_item(&reader, index, pin, &cancel)?,
            None => self.cards()?.erase(&reader, pin, &cancel)?,
        }
        Ok(())
    }

    fn card_verify_pin(&mut self, arg: &ReaderArg, out: &mut dyn Write) -> Result<()> {
        let reader = self.reader(arg)?;
        let pin = env_secret(&self.config.secrets.pin_env, "card PIN")?;
        self.cards()?.verify_pin(&reader, &pin)?;
        writeln!(out, "PIN verified")?;
        Ok(())
    }

    fn card_set_pin(&mut self, arg: &ReaderArg, out: &mut dyn Write) -> Result<()> {
        let reader = self.reader(arg)?;
        let new_pin = self.new_pin()?;
        self.cards()?.set_pin(&reader, &new_pin)?;
        writeln!(out, "PIN set")?;
        Ok(())
    }

    fn card_change_pin(&mut self, arg: &ReaderArg, out: &mut dyn Write) -> Result<()> {
        let reader = self.reader(arg)?;
        let old_pin = env_secret(&self.config.secrets.pin_env, "current card PIN")?;
        let new_pin = self.new_pin()?;
        self.cards()?.change_pin(&reader, &old_pin, &new_pin)?;
        writeln!(out, "PIN changed")?;
        Ok(())
    }

    fn card_clone(&mut self, arg: &ReaderArg, destination: &str, out: &mut dyn Write) -> Result<()> {
        let source = self.reader(arg)?;
        let source_pin = self.pin();
        let destination_pin = optional_env_secret(&self.config.secrets.new_pin_env);

        let copied = self.cards()?.clone_card(
            &source,
            destination,
            source_pin.as_deref().map(String::as_str),
            destination_pin.as_deref().map(String::as_str),
            &CancelToken::new(),
        )?;
        writeln!(out, "Cloned {} items from {} to {}", copied, source, destination)?;
        Ok(())
    }
}

fn item_file_name(index: usize, item: &CardItem) -> String {
    let ext = match item.kind {
        ItemKind::Share => "txt",
        ItemKind::Vault | ItemKind::Instruction => "json",
        ItemKind::Keyfile => "bin",
    };
    format!("{:02}-{}.{}", index, item.kind, ext)
}
