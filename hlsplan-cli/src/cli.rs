use clap::Parser;
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser)]
#[command(
    author = "hua0512 <https://github.com/hua0512>",
    version,
    about = "HLS manifest resolver",
    long_about = "Resolves an HLS playlist into a segment plan ready for downloading.\n\
                  \n\
                  Master playlists are followed to their best variant, external audio and\n\
                  subtitle tracks are resolved, encryption keys are fetched and the result is\n\
                  written as meta.json into the working directory."
)]
pub struct CliArgs {
    /// Manifest URL, file: URI or local path
    #[arg(required = true, help = "URL, file: URI or local path of the .m3u8 manifest")]
    pub url: String,

    /// Working directory for the job
    #[arg(
        short = 'o',
        long,
        default_value = "./Downloads",
        help = "Directory receiving raw.m3u8, meta.json and the master playlist listing"
    )]
    pub work_dir: PathBuf,

    #[arg(long, help = "Base URL for relative segment URIs (default: derived from the manifest URL)")]
    pub base_url: Option<String>,

    /// Custom HTTP headers for manifest and key requests
    #[arg(
        long = "header",
        short = 'H',
        help = "Add custom HTTP header to requests (can be used multiple times). Format: 'Name: Value'",
        value_name = "HEADER"
    )]
    pub headers: Vec<String>,

    #[arg(
        long,
        conflicts_with = "key_base64",
        help = "Path or URI of a file holding the raw AES-128 key"
    )]
    pub key_file: Option<String>,

    #[arg(long, help = "AES-128 key as base64 text")]
    pub key_base64: Option<String>,

    #[arg(long, help = "IV to use with --key-file/--key-base64, hex with or without 0x")]
    pub key_iv: Option<String>,

    /// Download range
    #[arg(
        short = 'r',
        long,
        help = "Range to keep: \"HH:MM:SS-HH:MM:SS\" or segment indices \"<start>-<end>\"; either side may be empty"
    )]
    pub range: Option<String>,

    #[arg(long, help = "Resolve the external audio track instead of the video stream")]
    pub audio_only: bool,

    #[arg(long, help = "Keep segments recognised as advertisements")]
    pub keep_ads: bool,

    #[arg(
        long,
        default_value = "4",
        help = "Maximum number of master/audio playlist redirections"
    )]
    pub max_redirects: usize,

    /// Overall timeout in seconds
    #[arg(
        long,
        default_value = "60",
        help = "Timeout in seconds for manifest and key requests"
    )]
    pub timeout: u64,

    /// Connection timeout in seconds
    #[arg(
        long,
        default_value = "10",
        help = "Connection timeout in seconds (time to establish initial connection)"
    )]
    pub connect_timeout: u64,

    /// Proxy URL (e.g., "http://proxy.example.com:8080")
    #[arg(
        long,
        help = "Proxy server URL (e.g., \"http://proxy.example.com:8080\")"
    )]
    pub proxy: Option<String>,

    /// Proxy type (http, https, socks5, all)
    #[arg(
        long,
        default_value = "http",
        help = "Proxy type (http, https, socks5, all)",
        value_parser = ["http", "https", "socks5", "all"]
    )]
    pub proxy_type: String,

    #[arg(long, help = "Username for proxy authentication")]
    pub proxy_user: Option<String>,

    #[arg(long, help = "Password for proxy authentication")]
    pub proxy_pass: Option<String>,

    /// Disable all proxy settings
    #[arg(
        long,
        help = "Disable all proxy settings (including system proxy)"
    )]
    pub no_proxy: bool,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,

    #[arg(
        long,
        default_value = "hlsplan.log",
        help = "File receiving a copy of the log output"
    )]
    pub log_file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let args = CliArgs::try_parse_from(["hlsplan", "https://h/index.m3u8"]).unwrap();
        assert_eq!(args.url, "https://h/index.m3u8");
        assert_eq!(args.work_dir, PathBuf::from("./Downloads"));
        assert_eq!(args.max_redirects, 4);
        assert!(!args.audio_only);
        assert!(args.headers.is_empty());
    }

    #[test]
    fn test_parse_full() {
        let args = CliArgs::try_parse_from([
            "hlsplan",
            "https://h/index.m3u8",
            "-H",
            "Referer: https://h/",
            "-H",
            "Cookie: a=b",
            "--key-base64",
            "AAAA",
            "--key-iv",
            "0x01",
            "-r",
            "00:01:00-00:02:00",
            "--audio-only",
            "--proxy",
            "127.0.0.1:1080",
            "--proxy-type",
            "socks5",
        ])
        .unwrap();
        assert_eq!(args.headers.len(), 2);
        assert_eq!(args.key_base64.as_deref(), Some("AAAA"));
        assert_eq!(args.range.as_deref(), Some("00:01:00-00:02:00"));
        assert!(args.audio_only);
        assert_eq!(args.proxy_type, "socks5");
    }

    #[test]
    fn test_key_sources_conflict() {
        let result = CliArgs::try_parse_from([
            "hlsplan",
            "https://h/index.m3u8",
            "--key-file",
            "k.bin",
            "--key-base64",
            "AAAA",
        ]);
        assert!(result.is_err());
    }
}
