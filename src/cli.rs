use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print candidate text encodings of a file, most plausible first.
    Detect(DetectArgs),
    /// Split a text file into chapters and print one JSON record per chapter.
    Split(SplitArgs),
    /// Build an EPUB from a text file.
    Build(BuildArgs),
    /// Build an EPUB from a sequence of images.
    Images(ImagesArgs),
}

#[derive(Debug, Args)]
pub struct DetectArgs {
    /// Input text file.
    #[arg(long)]
    pub input: String,
}

#[derive(Debug, Args)]
pub struct RuleArgs {
    /// Regex a title line must match at its start (repeatable).
    #[arg(long = "allow", value_name = "REGEX")]
    pub allow: Vec<String>,

    /// Substring that disqualifies a line from being a title (repeatable).
    #[arg(long = "block", value_name = "TEXT")]
    pub block: Vec<String>,

    /// YAML file with `allow:` and `block:` lists.
    #[arg(long)]
    pub rules: Option<String>,
}

#[derive(Debug, Args)]
pub struct TextArgs {
    /// Input text file.
    #[arg(long)]
    pub input: String,

    /// Encoding label (e.g. `gbk`, `big5`); detected when omitted.
    #[arg(long)]
    pub encoding: Option<String>,

    /// Drop whitespace-only lines before splitting.
    #[arg(long)]
    pub remove_empty_lines: bool,
}

#[derive(Debug, Args)]
pub struct SplitArgs {
    #[command(flatten)]
    pub text: TextArgs,

    #[command(flatten)]
    pub rules: RuleArgs,

    /// Number of body lines included in each record's preview.
    #[arg(long, default_value_t = 3)]
    pub preview_lines: usize,
}

#[derive(Debug, Args)]
pub struct MetadataArgs {
    /// Book author.
    #[arg(long)]
    pub author: Option<String>,

    /// Introduction text.
    #[arg(long, conflicts_with = "intro_file")]
    pub intro: Option<String>,

    /// File holding the introduction text.
    #[arg(long)]
    pub intro_file: Option<String>,

    /// Cover image file.
    #[arg(long, conflicts_with = "cover_url")]
    pub cover: Option<String>,

    /// Cover image URL (http/https). A failed download is logged and skipped.
    #[arg(long)]
    pub cover_url: Option<String>,

    /// Book language (BCP-47).
    #[arg(long)]
    pub lang: Option<String>,

    /// Overwrite the output file if it exists.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct BuildArgs {
    #[command(flatten)]
    pub text: TextArgs,

    #[command(flatten)]
    pub rules: RuleArgs,

    /// Output EPUB path.
    #[arg(long)]
    pub out: String,

    /// Book title (default: input file name without `.txt`).
    #[arg(long)]
    pub title: Option<String>,

    #[command(flatten)]
    pub metadata: MetadataArgs,
}

#[derive(Debug, Args)]
pub struct ImagesArgs {
    /// Output EPUB path.
    #[arg(long)]
    pub out: String,

    /// Book title.
    #[arg(long)]
    pub title: String,

    /// Put every image in a single content document.
    #[arg(long)]
    pub single_page: bool,

    #[command(flatten)]
    pub metadata: MetadataArgs,

    /// Image files, in reading order.
    #[arg(required = true, value_name = "IMAGES")]
    pub images: Vec<String>,
}
