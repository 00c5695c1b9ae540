//! PDF Workbench CLI tool
//!
//! A command-line front end over the assembly engine: merge PDFs and
//! images, split a document into per-page files, inspect a document.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use glob::glob;
use std::path::{Path, PathBuf};
use std::process;

use pdf_workbench::{
    DocumentAssembler, DocumentSource, Encryption, Metadata, Method, PageSplitter, PasswordList,
    PdfVersion, Rotation,
};

/// PDF Workbench - Merge, split and inspect PDF documents
#[derive(Parser)]
#[command(name = "pdf-workbench")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    # Merge PDFs (and images) into one document
    pdf-workbench merge -o output.pdf *.pdf scan.png

    # Merge with metadata and AES-128 encryption
    pdf-workbench merge -o output.pdf --title \"Report\" --encrypt aes128 --owner-password secret a.pdf b.pdf

    # Split a document into one file per page
    pdf-workbench split report.pdf -o pages/

    # Inspect a protected document
    pdf-workbench info locked.pdf --password hunter2")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum CipherArg {
    Rc40,
    Aes128,
    Aes256,
}

impl From<CipherArg> for Method {
    fn from(arg: CipherArg) -> Method {
        match arg {
            CipherArg::Rc40 => Method::Rc40,
            CipherArg::Aes128 => Method::Aes128,
            CipherArg::Aes256 => Method::Aes256,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Merge PDF and image files into one document
    Merge {
        /// Input files (in order). Supports glob patterns like "*.pdf"
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Output PDF file path
        #[arg(short, long)]
        output: PathBuf,

        /// Rotate every page by this many degrees (multiple of 90)
        #[arg(long, default_value_t = 0)]
        rotate: i32,

        /// Document title
        #[arg(long)]
        title: Option<String>,

        /// Document author
        #[arg(long)]
        author: Option<String>,

        /// Target PDF version, e.g. "1.7"
        #[arg(long)]
        pdf_version: Option<String>,

        /// Encrypt the output with this cipher
        #[arg(long, value_enum)]
        encrypt: Option<CipherArg>,

        /// Owner password for the encrypted output
        #[arg(long)]
        owner_password: Option<String>,

        /// User password; when set, the output requires it to open
        #[arg(long)]
        user_password: Option<String>,

        /// Passwords to try for protected inputs (in order)
        #[arg(long = "password")]
        passwords: Vec<String>,
    },

    /// Split a document into one file per page
    Split {
        /// Input PDF file
        input: PathBuf,

        /// Output folder
        #[arg(short, long)]
        output: PathBuf,

        /// Base name for output files (defaults to the input's stem)
        #[arg(long)]
        base_name: Option<String>,

        /// Passwords to try if the input is protected (in order)
        #[arg(long = "password")]
        passwords: Vec<String>,
    },

    /// Show information about a PDF file
    Info {
        /// PDF file to inspect
        input: PathBuf,

        /// Passwords to try if the input is protected (in order)
        #[arg(long = "password")]
        passwords: Vec<String>,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Merge {
            inputs,
            output,
            rotate,
            title,
            author,
            pdf_version,
            encrypt,
            owner_password,
            user_password,
            passwords,
        } => cmd_merge(
            inputs,
            output,
            rotate,
            title,
            author,
            pdf_version,
            encrypt,
            owner_password,
            user_password,
            passwords,
        ),
        Commands::Split {
            input,
            output,
            base_name,
            passwords,
        } => cmd_split(input, output, base_name, passwords),
        Commands::Info { input, passwords } => cmd_info(input, passwords),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

/// Expand glob patterns in input paths
fn expand_globs(patterns: Vec<String>) -> anyhow::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for pattern in patterns {
        if pattern.contains('*') || pattern.contains('?') || pattern.contains('[') {
            let mut matched = false;
            for entry in glob(&pattern).context("invalid glob pattern")? {
                match entry {
                    Ok(path) => {
                        paths.push(path);
                        matched = true;
                    }
                    Err(e) => eprintln!("Warning: glob error for {}: {}", pattern, e),
                }
            }
            if !matched {
                bail!("No files matched pattern: {}", pattern);
            }
        } else {
            paths.push(PathBuf::from(pattern));
        }
    }

    Ok(paths)
}

#[allow(clippy::too_many_arguments)]
fn cmd_merge(
    inputs: Vec<String>,
    output: PathBuf,
    rotate: i32,
    title: Option<String>,
    author: Option<String>,
    pdf_version: Option<String>,
    encrypt: Option<CipherArg>,
    owner_password: Option<String>,
    user_password: Option<String>,
    passwords: Vec<String>,
) -> anyhow::Result<()> {
    let inputs = expand_globs(inputs)?;
    for path in &inputs {
        if !path.exists() {
            bail!("Input file not found: {}", path.display());
        }
    }

    let rotation = Rotation::from_degrees(rotate)
        .with_context(|| format!("rotation must be a multiple of 90, got {}", rotate))?;

    let mut metadata = Metadata {
        title,
        author,
        ..Metadata::default()
    };
    if let Some(version) = &pdf_version {
        metadata.version = PdfVersion::parse(version)
            .with_context(|| format!("invalid PDF version: {}", version))?;
    }

    let mut encryption = Encryption::default();
    if let Some(cipher) = encrypt {
        let owner = owner_password
            .context("--encrypt requires --owner-password")?;
        encryption = Encryption {
            enabled: true,
            method: cipher.into(),
            owner_password: owner,
            open_with_password: user_password.is_some(),
            user_password: user_password.unwrap_or_default(),
            ..Encryption::default()
        };
    }

    eprintln!("Merging {} files...", inputs.len());

    let mut assembler = DocumentAssembler::new();
    assembler.set_metadata(metadata);
    assembler.set_encryption(encryption);

    for path in &inputs {
        let source = open_source(path, &passwords)?;
        let pages = source.pages();
        if rotation != Rotation::None {
            assembler.extend_pages(pages.iter().map(|page| page.rotated(rotation)));
        } else {
            assembler.extend_pages(pages);
        }
    }

    assembler
        .save(&output)
        .with_context(|| format!("failed to write {}", output.display()))?;

    eprintln!("Merged to: {}", output.display());
    Ok(())
}

fn cmd_split(
    input: PathBuf,
    output: PathBuf,
    base_name: Option<String>,
    passwords: Vec<String>,
) -> anyhow::Result<()> {
    if !input.exists() {
        bail!("Input file not found: {}", input.display());
    }
    std::fs::create_dir_all(&output)
        .with_context(|| format!("cannot create {}", output.display()))?;

    let source = open_source(&input, &passwords)?;

    let mut splitter = PageSplitter::new();
    splitter.extend_pages(source.pages());
    if let Some(base) = base_name {
        splitter.set_base_name(base);
    }

    let written = splitter
        .save(&output)
        .with_context(|| format!("failed to split into {}", output.display()))?;

    eprintln!("Wrote {} files to {}", written.len(), output.display());
    Ok(())
}

fn cmd_info(input: PathBuf, passwords: Vec<String>) -> anyhow::Result<()> {
    if !input.exists() {
        bail!("Input file not found: {}", input.display());
    }

    let source = open_source(&input, &passwords)?;
    let file = source.file();
    let metadata = source.metadata();
    let encryption = source.encryption();

    println!("File: {}", input.display());
    println!("Pages: {}", file.page_count);
    println!("PDF version: {}", metadata.version);

    if let Some(title) = &metadata.title {
        println!("Title: {}", title);
    }
    if let Some(author) = &metadata.author {
        println!("Author: {}", author);
    }

    if encryption.enabled {
        println!("Encrypted: yes ({:?})", encryption.method);
        println!("Opens with user password: {}", encryption.open_with_password);
        let p = &encryption.permission;
        println!(
            "Permissions: print={} copy={} modify={} annotate={} forms={} accessibility={}",
            p.print, p.copy, p.modify, p.annotate, p.fill_forms, p.accessibility
        );
    } else {
        println!("Encrypted: no");
    }

    let attachments = source.attachments();
    if !attachments.is_empty() {
        println!("Attachments:");
        for attachment in attachments {
            println!("  {} ({} bytes)", attachment.name(), attachment.len());
        }
    }

    let bookmarks = source.bookmarks();
    if !bookmarks.is_empty() {
        println!("Bookmarks:");
        for bookmark in bookmarks {
            println!("  p.{} {}", bookmark.page, bookmark.title);
        }
    }

    Ok(())
}

fn open_source(
    path: &Path,
    passwords: &[String],
) -> anyhow::Result<pdf_workbench::OpenedDocument> {
    let mut provider = PasswordList::new(passwords.to_vec());
    DocumentSource::open(path, &mut provider)
        .with_context(|| format!("failed to open {}", path.display()))
}
