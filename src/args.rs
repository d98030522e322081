use clap::{Parser, Subcommand};

/// This is a program to count, verify and locate the protocols of polling wards.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The JSON configuration file. It tells where the protocols and the wards are
    /// stored, and which rules apply. See the manual of the protocol_count crate for the format.
    #[clap(short, long, value_parser)]
    pub config: String,

    #[clap(subcommand)]
    pub command: Command,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Tallies all the protocols of a ballot.
    Sum {
        /// (YYYY-MM-DD) The voting date.
        #[clap(long, value_parser)]
        date: String,
        /// The number of the ballot on that date.
        #[clap(long, value_parser)]
        ballot: u32,
        /// (file path, 'stdout' or empty) If specified, the summary of the ballot will be written
        /// in JSON format to the given location.
        #[clap(short, long, value_parser)]
        out: Option<String>,
        /// (file path) A reference file containing the expected summary in JSON format. If provided,
        /// ctrlpkw will check that the tabulated output matches the reference.
        #[clap(short, long, value_parser)]
        reference: Option<String>,
    },
    /// Records the approval or the deprecation of a protocol by a reviewer.
    Verify {
        #[clap(long, value_parser)]
        id: String,
        /// The identifier of the reviewer.
        #[clap(long, value_parser)]
        actor: String,
        /// 'approval' or 'deprecation'
        #[clap(long, value_parser)]
        decision: String,
    },
    /// Finds the wards closest to a point.
    Nearest {
        /// (YYYY-MM-DD) The voting date.
        #[clap(long, value_parser)]
        date: String,
        #[clap(long, value_parser, allow_hyphen_values = true)]
        latitude: f64,
        #[clap(long, value_parser, allow_hyphen_values = true)]
        longitude: f64,
        /// (meters) Overrides the radius from the configuration.
        #[clap(long, value_parser, allow_hyphen_values = true)]
        radius: Option<f64>,
        /// Overrides the minimum number of wards from the configuration.
        #[clap(long, value_parser)]
        min_count: Option<usize>,
    },
    /// Lists the protocols that have not been verified yet.
    Pending {
        /// (default 5) The maximum number of protocols to list.
        #[clap(long, value_parser)]
        count: Option<usize>,
    },
    /// Submits a new protocol described in a JSON file.
    Submit {
        /// (file path) The submission.
        #[clap(short, long, value_parser)]
        input: String,
        /// The identifier of the submitter, if authenticated.
        #[clap(long, value_parser)]
        actor: Option<String>,
        /// Also authorizes the upload of a first picture and prints the upload token.
        /// Requires the `images` settings.
        #[clap(long, takes_value = false)]
        authorize_picture: bool,
    },
    /// Shows one protocol.
    Show {
        #[clap(long, value_parser)]
        id: String,
    },
    /// Authorizes the upload of one more picture for a protocol.
    AuthorizeImage {
        #[clap(long, value_parser)]
        id: String,
    },
    /// Lists the addresses of the pictures of a protocol.
    Images {
        #[clap(long, value_parser)]
        id: String,
    },
}
