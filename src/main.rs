use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "desi-meme",
    version,
    about = "Caption memes in Indian languages and collect the captions into a corpus"
)]
struct Cli {
    /// Background image to caption (JPEG or PNG)
    #[arg(short = 'i', long = "image")]
    image: Option<String>,

    /// Predefined background ("Meme 1" .. "Meme 10")
    #[arg(short = 't', long = "template")]
    template: Option<String>,

    /// Caption text
    #[arg(short = 'c', long = "caption")]
    caption: Option<String>,

    /// Font size in pixels (default from settings, 20..=100)
    #[arg(short = 's', long = "font-size")]
    font_size: Option<u32>,

    /// Where to write the PNG (default: meme.png)
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Print the stored corpus, newest first
    #[arg(long = "show-corpus")]
    show_corpus: bool,

    /// Remove every stored caption (requires --password)
    #[arg(long = "clear-corpus")]
    clear_corpus: bool,

    /// Admin password for --clear-corpus
    #[arg(long = "password")]
    password: Option<String>,

    /// Show available templates and exit
    #[arg(long = "list-templates")]
    list_templates: bool,

    /// Download missing Noto fonts into the font directory
    #[arg(long = "fetch-fonts")]
    fetch_fonts: bool,

    /// Serve the HTTP API on ADDR (empty value uses [server] addr)
    #[arg(long = "server", value_name = "ADDR", num_args = 0..=1, default_missing_value = "")]
    server: Option<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    desi_meme_creator::logging::init(cli.verbose)?;

    let output = desi_meme_creator::run(desi_meme_creator::Config {
        image: cli.image,
        template: cli.template,
        caption: cli.caption,
        font_size: cli.font_size,
        output: cli.output,
        show_corpus: cli.show_corpus,
        clear_corpus: cli.clear_corpus,
        password: cli.password,
        list_templates: cli.list_templates,
        fetch_fonts: cli.fetch_fonts,
        server: cli.server,
        settings_path: cli.read_settings,
    })
    .await?;

    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}
