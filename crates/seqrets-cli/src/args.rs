//! Command line definition.

use clap::{Args, Parser, Subcommand, ValueEnum};
use seqrets_card::ItemKind;
use std::path::PathBuf;

const ENV_HELP: &str = "\
SECRETS (variable names configurable under [secrets]):
    SEQRETS_PASSWORD        Share password
    SEQRETS_VAULT_PASSWORD  Vault file password
    SEQRETS_PIN             Card PIN
    SEQRETS_NEW_PIN         PIN to set, change to, or put on a clone

ENVIRONMENT VARIABLES (override config file):
    SEQRETS_LOG_LEVEL       Log level or RUST_LOG style filter
    SEQRETS_CARD_BACKEND    pcsc or simulator
    SEQRETS_CARD_READER     Default reader name
    SEQRETS_PASSWORD_ENV    Name of the share password variable
    SEQRETS_VAULT_PASSWORD_ENV
    SEQRETS_PIN_ENV
    SEQRETS_NEW_PIN_ENV
    SEQRETS_VAULT_LABEL     Default label for exported vaults";

#[derive(Parser, Debug)]
#[command(
    name = "seqrets",
    version,
    about = "seQRets: split secrets into encrypted Qards",
    after_help = ENV_HELP
)]
pub struct Cli {
    /// Config file (default: ./seqrets.toml if present)
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Validate configuration and exit
    #[arg(long)]
    pub validate: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encrypt a secret and print the shares
    Split(SplitArgs),
    /// Restore a secret from share files, a vault, or stdin
    Restore(RestoreArgs),
    /// Exported vault files
    #[command(subcommand)]
    Vault(VaultCommand),
    /// Encrypted instructions
    #[command(subcommand)]
    Instruction(InstructionCommand),
    /// Fresh mnemonics and keyfiles
    #[command(subcommand)]
    Generate(GenerateCommand),
    /// seQRets smart cards
    #[command(subcommand)]
    Card(CardCommand),
}

#[derive(Args, Debug)]
pub struct SplitArgs {
    /// Shares needed to restore
    #[arg(long, value_name = "T")]
    pub threshold: u8,
    /// Shares to produce
    #[arg(long, value_name = "N")]
    pub total: u8,
    /// Read the secret text from FILE (default: stdin)
    #[arg(long, value_name = "FILE", conflicts_with = "file")]
    pub text: Option<PathBuf>,
    /// Split a file instead of text
    #[arg(long, value_name = "FILE")]
    pub file: Option<PathBuf>,
    #[arg(long, value_name = "FILE")]
    pub keyfile: Option<PathBuf>,
    /// Also export the shares as a vault file
    #[arg(long, value_name = "FILE")]
    pub vault: Option<PathBuf>,
    /// Vault label (default from config)
    #[arg(long, requires = "vault")]
    pub label: Option<String>,
    /// Encrypted instruction JSON to embed in the vault
    #[arg(long, value_name = "FILE", requires = "vault")]
    pub instructions: Option<PathBuf>,
    /// Encrypt the vault file under the vault password
    #[arg(long, requires = "vault")]
    pub encrypt: bool,
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Files with one share per line
    #[arg(value_name = "SHARE_FILE")]
    pub shares: Vec<PathBuf>,
    /// Take shares from a vault file
    #[arg(long, value_name = "FILE")]
    pub vault: Option<PathBuf>,
    #[arg(long, value_name = "FILE")]
    pub keyfile: Option<PathBuf>,
    /// Write the secret here instead of stdout (required for files)
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

// A file in, an optional file out
#[derive(Args, Debug)]
pub struct ConvertArgs {
    #[arg(value_name = "FILE")]
    pub path: PathBuf,
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

// Something to decrypt with the share password
#[derive(Args, Debug)]
pub struct OpenArgs {
    #[arg(value_name = "FILE")]
    pub path: PathBuf,
    #[arg(long, value_name = "FILE")]
    pub keyfile: Option<PathBuf>,
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum VaultCommand {
    /// Wrap an exported vault under the vault password
    Encrypt(ConvertArgs),
    /// Unwrap an encrypted vault file
    Decrypt(ConvertArgs),
    /// Show vault metadata
    Info {
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
    /// Decrypt the instructions inside a vault
    Instructions(OpenArgs),
}

#[derive(Subcommand, Debug)]
pub enum InstructionCommand {
    /// Encrypt a document or an inheritance plan
    Encrypt(InstructionEncryptArgs),
    /// Decrypt an instruction file
    Decrypt(OpenArgs),
}

#[derive(Args, Debug)]
pub struct InstructionEncryptArgs {
    #[arg(value_name = "FILE")]
    pub path: PathBuf,
    /// The file is a JSON inheritance plan
    #[arg(long)]
    pub plan: bool,
    /// MIME type of a plain document
    #[arg(long = "type", value_name = "MIME", conflicts_with = "plan")]
    pub file_type: Option<String>,
    #[arg(long, value_name = "FILE")]
    pub keyfile: Option<PathBuf>,
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum GenerateCommand {
    /// Print a new BIP-39 phrase
    Mnemonic {
        #[arg(long, default_value_t = 24)]
        words: usize,
    },
    /// Write 32 random bytes
    Keyfile {
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct ReaderArg {
    /// Reader name (default: card.reader, else the first reader)
    #[arg(long, value_name = "READER")]
    pub reader: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum CardCommand {
    /// List smart card readers
    List,
    /// Show the card status as JSON
    Status(ReaderArg),
    /// List the items on a card, optionally saving them
    Read {
        #[command(flatten)]
        reader: ReaderArg,
        #[arg(long, value_name = "DIR")]
        out_dir: Option<PathBuf>,
    },
    /// Add an item to a card
    Write {
        #[arg(value_enum)]
        kind: ItemArg,
        #[arg(value_name = "FILE")]
        path: PathBuf,
        #[arg(long)]
        label: Option<String>,
        #[command(flatten)]
        reader: ReaderArg,
    },
    /// Erase one item, or the whole card
    Erase {
        #[arg(long, value_name = "INDEX")]
        item: Option<usize>,
        #[command(flatten)]
        reader: ReaderArg,
    },
    /// Check the PIN in the PIN variable
    VerifyPin(ReaderArg),
    /// Put the new PIN on a card that has none
    SetPin(ReaderArg),
    /// Replace the current PIN with the new PIN
    ChangePin(ReaderArg),
    /// Copy every item to the card in another reader
    Clone {
        #[arg(long, value_name = "READER")]
        to: String,
        #[command(flatten)]
        reader: ReaderArg,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemArg {
    Share,
    Vault,
    Keyfile,
    Instruction,
}

impl From<ItemArg> for ItemKind {
    fn from(arg: ItemArg) -> Self {
        match arg {
            ItemArg::Share => ItemKind::Share,
            ItemArg::Vault => ItemKind::Vault,
            ItemArg::Keyfile => ItemKind::Keyfile,
            ItemArg::Instruction => ItemKind::Instruction,
        }
    }
}
