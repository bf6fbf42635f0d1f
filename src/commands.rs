// Shell grammar and dispatch: parse a command line, validate, call the service, render

use clap::{error::ErrorKind as ClapErrorKind, ArgAction, Args, Parser, Subcommand};
use serde_json::{json, Value};
use std::{collections::BTreeMap, path::Path, sync::Arc};
use tracing::{debug, info};

use crate::{
    config::CliConfig,
    csv_io::{self, Progress, SilentProgress},
    error::{CliError, ParameterError, Result},
    format,
    service::{self, MilvusService},
    timestamp,
    validation::{
        self, QueryInput, RawOperand, SearchInput, VectorKind,
    },
};

// --- Grammar ---

/// One line typed at the prompt.
#[derive(Parser, Debug)]
#[command(name = "milvus_cli", no_binary_name = true, disable_version_flag = true)]
pub struct ShellLine {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Connect to a Milvus instance, or drop a connection with -D.
    #[command(disable_help_flag = true)]
    Connect(ConnectArgs),
    /// Show connection, loading or index state.
    #[command(subcommand)]
    Show(ShowCommand),
    /// Load a collection (or some of its partitions) into memory.
    Load(LoadArgs),
    /// Release a collection (or some of its partitions) from memory.
    Release(LoadArgs),
    #[command(subcommand)]
    List(ListCommand),
    #[command(subcommand)]
    Describe(DescribeCommand),
    #[command(subcommand)]
    Create(CreateCommand),
    #[command(subcommand)]
    Delete(DeleteCommand),
    /// Vector similarity search.
    Search(SearchArgs),
    /// Boolean-expression query.
    Query(QueryArgs),
    /// Insert the rows of a CSV file (local path or URL).
    Import(ImportArgs),
    #[command(subcommand)]
    Calc(CalcCommand),
    /// Move sealed segments between query nodes.
    #[command(name = "load_balance")]
    LoadBalance(LoadBalanceArgs),
    Version,
    /// Clear the screen.
    Clear,
    Exit,
}

#[derive(Args, Debug, Clone)]
pub struct ConnectArgs {
    #[arg(short = 'a', long)]
    pub alias: Option<String>,
    #[arg(short = 'h', long)]
    pub host: Option<String>,
    #[arg(short = 'p', long)]
    pub port: Option<u16>,
    /// Disconnect the alias instead.
    #[arg(short = 'D', long)]
    pub disconnect: bool,
    #[arg(long, action = ArgAction::Help)]
    pub help: Option<bool>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ShowCommand {
    Connection {
        #[arg(short = 'a', long)]
        alias: Option<String>,
        #[arg(long)]
        all: bool,
    },
    #[command(name = "loading_progress")]
    LoadingProgress {
        #[arg(short = 'c', long = "collection-name")]
        collection: String,
        #[arg(short = 'p', long = "partition")]
        partitions: Vec<String>,
    },
    #[command(name = "index_progress")]
    IndexProgress {
        #[arg(short = 'c', long = "collection-name")]
        collection: String,
        #[arg(short = 'i', long = "index-name")]
        index: Option<String>,
    },
    #[command(name = "query_segment")]
    QuerySegment {
        #[arg(short = 'c', long = "collection-name")]
        collection: String,
        #[arg(short = 't', long)]
        timeout: Option<String>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct LoadArgs {
    #[arg(short = 'c', long = "collection-name")]
    pub collection: String,
    #[arg(short = 'p', long = "partition")]
    pub partitions: Vec<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ListCommand {
    Collections,
    Partitions {
        #[arg(short = 'c', long = "collection-name")]
        collection: String,
    },
    Indexes {
        #[arg(short = 'c', long = "collection-name")]
        collection: String,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum DescribeCommand {
    Collection {
        #[arg(short = 'c', long = "collection-name")]
        collection: String,
    },
    Partition {
        #[arg(short = 'c', long = "collection-name")]
        collection: String,
        #[arg(short = 'p', long = "partition", default_value = "_default")]
        partition: String,
    },
    Index {
        #[arg(short = 'c', long = "collection-name")]
        collection: String,
        #[arg(short = 'i', long = "index-name")]
        index: Option<String>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum CreateCommand {
    /// Point one or more aliases at a collection.
    Alias {
        #[arg(short = 'c', long = "collection-name")]
        collection: String,
        #[arg(short = 'a', long = "alias-name", required = true)]
        aliases: Vec<String>,
        /// Move existing aliases instead of creating them.
        #[arg(short = 'A', long)]
        alter: bool,
        #[arg(short = 't', long)]
        timeout: Option<String>,
    },
    Collection(CreateCollectionArgs),
    Partition {
        #[arg(short = 'c', long = "collection-name")]
        collection: String,
        #[arg(short = 'p', long = "partition")]
        partition: String,
        #[arg(short = 'd', long)]
        description: Option<String>,
    },
    Index(CreateIndexArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CreateCollectionArgs {
    #[arg(short = 'c', long = "collection-name", default_value = "")]
    pub collection: String,
    #[arg(short = 'p', long = "schema-primary-field", default_value = "")]
    pub primary_field: String,
    #[arg(short = 'a', long = "schema-auto-id")]
    pub auto_id: bool,
    #[arg(short = 'd', long = "schema-description", default_value = "")]
    pub description: String,
    /// `name:TYPE:extra`, repeatable.
    #[arg(short = 'f', long = "schema-field")]
    pub fields: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct CreateIndexArgs {
    #[arg(short = 'c', long = "collection-name")]
    pub collection: String,
    #[arg(short = 'f', long = "field-name")]
    pub field: String,
    #[arg(short = 't', long = "index-type")]
    pub index_type: String,
    #[arg(short = 'm', long = "metric-type")]
    pub metric_type: String,
    /// `name:value`, repeatable or comma separated.
    #[arg(short = 'p', long = "index-param", value_delimiter = ',')]
    pub params: Vec<String>,
    #[arg(long)]
    pub timeout: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum DeleteCommand {
    Alias {
        #[arg(short = 'a', long = "alias-name")]
        alias: String,
        #[arg(short = 't', long)]
        timeout: Option<String>,
    },
    Collection {
        #[arg(short = 'c', long = "collection-name")]
        collection: String,
        #[arg(short = 't', long)]
        timeout: Option<String>,
        #[arg(short = 'y', long)]
        yes: bool,
    },
    Partition {
        #[arg(short = 'c', long = "collection-name")]
        collection: String,
        #[arg(short = 'p', long = "partition")]
        partition: String,
        #[arg(short = 't', long)]
        timeout: Option<String>,
        #[arg(short = 'y', long)]
        yes: bool,
    },
    Index {
        #[arg(short = 'c', long = "collection-name")]
        collection: String,
        #[arg(short = 'i', long = "index-name")]
        index: Option<String>,
        #[arg(short = 't', long)]
        timeout: Option<String>,
        #[arg(short = 'y', long)]
        yes: bool,
    },
    Entities {
        #[arg(short = 'c', long = "collection-name")]
        collection: String,
        #[arg(short = 'e', long = "expr", default_value = "")]
        expr: String,
        #[arg(short = 'p', long = "partition")]
        partition: Option<String>,
        #[arg(short = 't', long)]
        timeout: Option<String>,
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    #[arg(short = 'c', long = "collection-name")]
    pub collection: String,
    /// `[[...], ...]` literal or a CSV file whose first column holds the vectors.
    #[arg(short = 'd', long)]
    pub data: String,
    #[arg(short = 'a', long = "anns-field", default_value = "")]
    pub anns_field: String,
    /// Defaults to the metric of the collection's index.
    #[arg(short = 'm', long = "metric-type")]
    pub metric_type: Option<String>,
    /// `name:value`, repeatable or comma separated.
    #[arg(short = 'P', long = "search-param", value_delimiter = ',')]
    pub params: Vec<String>,
    #[arg(short = 'l', long)]
    pub limit: String,
    #[arg(short = 'e', long)]
    pub expr: Option<String>,
    /// Comma separated partition names.
    #[arg(short = 'p', long = "partition-names")]
    pub partitions: Option<String>,
    #[arg(short = 't', long)]
    pub timeout: Option<String>,
    #[arg(short = 'r', long = "round-decimal")]
    pub round_decimal: Option<String>,
    #[arg(short = 'g', long = "guarantee-timestamp")]
    pub guarantee_timestamp: Option<String>,
    #[arg(short = 'T', long = "travel-timestamp")]
    pub travel_timestamp: Option<String>,
    /// Also write the hits to this CSV file.
    #[arg(long)]
    pub export: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    #[arg(short = 'c', long = "collection-name")]
    pub collection: String,
    #[arg(short = 'e', long, default_value = "")]
    pub expr: String,
    #[arg(short = 'p', long = "partition-names")]
    pub partitions: Option<String>,
    #[arg(short = 'o', long = "output-fields")]
    pub output_fields: Option<String>,
    #[arg(short = 't', long)]
    pub timeout: Option<String>,
    #[arg(short = 'g', long = "guarantee-timestamp")]
    pub guarantee_timestamp: Option<String>,
    #[arg(long = "graceful-time")]
    pub graceful_time: Option<String>,
    #[arg(short = 'T', long = "travel-timestamp")]
    pub travel_timestamp: Option<String>,
    #[arg(long)]
    pub export: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    #[arg(short = 'c', long = "collection-name")]
    pub collection: String,
    #[arg(short = 'p', long = "partition")]
    pub partition: Option<String>,
    #[arg(short = 't', long)]
    pub timeout: Option<String>,
    pub path: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CalcCommand {
    /// Distances between two vector sets, each given inline or by id.
    Distance(CalcDistanceArgs),
    #[command(name = "mkts_from_hybridts")]
    MktsFromHybridts {
        #[arg(long)]
        hybridts: String,
        #[arg(long)]
        milliseconds: Option<String>,
    },
    #[command(name = "mkts_from_unixtime")]
    MktsFromUnixtime {
        #[arg(long)]
        epoch: String,
        #[arg(long)]
        milliseconds: Option<String>,
    },
    #[command(name = "hybridts_to_unixtime")]
    HybridtsToUnixtime {
        #[arg(long)]
        hybridts: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct CalcDistanceArgs {
    #[arg(long = "left-vector-type", default_value = "float_vectors")]
    pub left_type: VectorKind,
    #[arg(long = "left-vectors")]
    pub left_vectors: Option<String>,
    #[arg(long = "left-ids", default_value = "")]
    pub left_ids: String,
    #[arg(long = "left-collection", default_value = "")]
    pub left_collection: String,
    #[arg(long = "left-partition", default_value = "")]
    pub left_partition: String,
    #[arg(long = "left-field", default_value = "")]
    pub left_field: String,
    #[arg(long = "right-vector-type", default_value = "float_vectors")]
    pub right_type: VectorKind,
    #[arg(long = "right-vectors")]
    pub right_vectors: Option<String>,
    #[arg(long = "right-ids", default_value = "")]
    pub right_ids: String,
    #[arg(long = "right-collection", default_value = "")]
    pub right_collection: String,
    #[arg(long = "right-partition", default_value = "")]
    pub right_partition: String,
    #[arg(long = "right-field", default_value = "")]
    pub right_field: String,
    #[arg(short = 'm', long = "metric-type", default_value = "L2")]
    pub metric_type: String,
    #[arg(long)]
    pub sqrt: bool,
    #[arg(long)]
    pub dim: Option<u32>,
    #[arg(short = 't', long)]
    pub timeout: Option<String>,
}

impl CalcDistanceArgs {
    fn operands(&self) -> (RawOperand, RawOperand) {
        let side = |kind: VectorKind,
                    vectors: &Option<String>,
                    ids: &str,
                    collection: &str,
                    partition: &str,
                    field: &str| match vectors {
            Some(vectors) => RawOperand::Raw {
                kind,
                vectors: vectors.clone(),
            },
            None => RawOperand::Imported {
                ids: ids.to_string(),
                collection: collection.to_string(),
                partition: partition.to_string(),
                field: field.to_string(),
            },
        };
        (
            side(
                self.left_type,
                &self.left_vectors,
                &self.left_ids,
                &self.left_collection,
                &self.left_partition,
                &self.left_field,
            ),
            side(
                self.right_type,
                &self.right_vectors,
                &self.right_ids,
                &self.right_collection,
                &self.right_partition,
                &self.right_field,
            ),
        )
    }
}

#[derive(Args, Debug, Clone)]
pub struct LoadBalanceArgs {
    #[arg(short = 's', long = "src-node-id")]
    pub src_node: i64,
    #[arg(short = 'd', long = "dst-node-id", value_delimiter = ',')]
    pub dst_nodes: Vec<i64>,
    #[arg(short = 'S', long = "sealed-segment-id", value_delimiter = ',')]
    pub sealed_segments: Vec<i64>,
    #[arg(short = 't', long)]
    pub timeout: Option<String>,
}

/// Splits a command line on whitespace, keeping quoted spans together. Quotes are removed;
/// the other quote character and backslashes inside a span are kept as typed.
pub fn split_line(line: &str) -> std::result::Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if let Some(q) = quote {
        return Err(format!("unterminated {} quote", q));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

// --- Session ---

/// What the prompt should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Output(String),
    Clear,
    Exit,
}

/// Asks the user to confirm a destructive command.
pub type Confirm = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Connections opened so far and the alias commands run against.
pub struct Session {
    config: CliConfig,
    connections: BTreeMap<String, Arc<dyn MilvusService>>,
    active: Option<String>,
    progress: Arc<dyn Progress>,
    confirm: Confirm,
}

fn timeout_of(raw: &Option<String>) -> std::result::Result<Option<f64>, ParameterError> {
    validation::optional_timeout(raw.as_deref())
}

fn non_empty(values: &[String]) -> Option<&[String]> {
    (!values.is_empty()).then_some(values)
}

impl Session {
    pub fn new(config: CliConfig) -> Self {
        Self {
            config,
            connections: BTreeMap::new(),
            active: None,
            progress: Arc::new(SilentProgress),
            confirm: Box::new(|_: &str| true),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_confirm(mut self, confirm: Confirm) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn config(&self) -> &CliConfig {
        &self.config
    }

    /// Registers an open service under its alias and makes it the active one.
    pub fn insert_connection(&mut self, service: Arc<dyn MilvusService>) {
        let alias = service.connection().alias.clone();
        self.connections.insert(alias.clone(), service);
        self.active = Some(alias);
    }

    pub fn active_alias(&self) -> Option<&str> {
        self.active.as_deref()
    }

    fn service(&self) -> Result<Arc<dyn MilvusService>> {
        let alias = self
            .active
            .clone()
            .unwrap_or_else(|| self.config.alias.clone());
        self.connections
            .get(&alias)
            .cloned()
            .ok_or(CliError::NotConnected(alias))
    }

    fn confirmed(&self, yes: bool, what: &str) -> bool {
        yes || (self.confirm)(&format!(
            "Warning! You are trying to delete {}. This action cannot be undone!",
            what
        ))
    }

    /// Tokenizes and runs one line. Help requests come back as output.
    pub async fn run_line(&mut self, line: &str) -> Result<Outcome> {
        let tokens = split_line(line).map_err(CliError::Usage)?;
        if tokens.is_empty() {
            return Ok(Outcome::Output(String::new()));
        }
        match ShellLine::try_parse_from(&tokens) {
            Ok(parsed) => self.execute(parsed.command).await,
            Err(e) if matches!(e.kind(), ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand) => {
                Ok(Outcome::Output(e.render().to_string()))
            }
            Err(e) => Err(CliError::Usage(e.render().to_string().trim_end().to_string())),
        }
    }

    pub async fn execute(&mut self, command: Command) -> Result<Outcome> {
        debug!("Executing {:?}", command);
        let output = match command {
            Command::Connect(args) => self.connect(args).await?,
            Command::Show(cmd) => self.show(cmd).await?,
            Command::Load(args) => {
                let service = self.service()?;
                let partitions = non_empty(&args.partitions);
                service.load(&args.collection, partitions).await?;
                let progress = service.loading_progress(&args.collection, partitions).await?;
                format!(
                    "Loaded {}.\n{}",
                    args.collection,
                    format::loading_progress(&progress)
                )
            }
            Command::Release(args) => {
                self.service()?
                    .release(&args.collection, non_empty(&args.partitions))
                    .await?;
                format!("Released {}.", args.collection)
            }
            Command::List(cmd) => self.list(cmd).await?,
            Command::Describe(cmd) => self.describe(cmd).await?,
            Command::Create(cmd) => self.create(cmd).await?,
            Command::Delete(cmd) => self.delete(cmd).await?,
            Command::Search(args) => self.search(args).await?,
            Command::Query(args) => self.query(args).await?,
            Command::Import(args) => self.import(args).await?,
            Command::Calc(cmd) => self.calc(cmd).await?,
            Command::LoadBalance(args) => {
                let timeout = timeout_of(&args.timeout)?;
                self.service()?
                    .load_balance(args.src_node, &args.dst_nodes, &args.sealed_segments, timeout)
                    .await?;
                "Load balance done.".to_string()
            }
            Command::Version => format!("Milvus Cli v{}", env!("CARGO_PKG_VERSION")),
            Command::Clear => return Ok(Outcome::Clear),
            Command::Exit => return Ok(Outcome::Exit),
        };
        Ok(Outcome::Output(output))
    }

    async fn connect(&mut self, args: ConnectArgs) -> Result<String> {
        let alias = args.alias.unwrap_or_else(|| self.config.alias.clone());
        if args.disconnect {
            if self.connections.remove(&alias).is_none() {
                return Err(CliError::NotConnected(alias));
            }
            if self.active.as_deref() == Some(alias.as_str()) {
                self.active = None;
            }
            info!("Disconnected '{}'", alias);
            return Ok(format!("Disconnect from {} successfully!", alias));
        }
        let connection = self
            .config
            .connection(Some(&alias), args.host.as_deref(), args.port);
        let service = service::connect(connection, self.config.request_timeout).await?;
        self.insert_connection(service);
        Ok(format!("Connect Milvus successfully.\n{}", self.connection_table(false, None)))
    }

    fn connection_table(&self, all: bool, alias: Option<&str>) -> String {
        let selected = alias.or(self.active.as_deref());
        let rows: Vec<_> = self
            .connections
            .values()
            .map(|s| {
                let active = self.active.as_deref() == Some(s.connection().alias.as_str());
                (s.connection(), active)
            })
            .filter(|(c, _)| all || selected == Some(c.alias.as_str()))
            .collect();
        format::connection_table(&rows)
    }

    async fn show(&mut self, cmd: ShowCommand) -> Result<String> {
        match cmd {
            ShowCommand::Connection { alias, all } => {
                if !all {
                    let wanted = alias.clone().or_else(|| self.active.clone());
                    match wanted {
                        Some(a) if self.connections.contains_key(&a) => {}
                        Some(a) => return Err(CliError::NotConnected(a)),
                        None => return Err(CliError::NotConnected(self.config.alias.clone())),
                    }
                }
                Ok(self.connection_table(all, alias.as_deref()))
            }
            ShowCommand::LoadingProgress {
                collection,
                partitions,
            } => {
                let progress = self
                    .service()?
                    .loading_progress(&collection, non_empty(&partitions))
                    .await?;
                Ok(format::loading_progress(&progress))
            }
            ShowCommand::IndexProgress { collection, index } => {
                match self
                    .service()?
                    .describe_index(&collection, index.as_deref())
                    .await?
                {
                    Some(details) => Ok(format::index_progress(&details)),
                    None => Ok(format!("No index on collection {}.", collection)),
                }
            }
            ShowCommand::QuerySegment {
                collection,
                timeout,
            } => {
                let timeout = timeout_of(&timeout)?;
                let segments = self
                    .service()?
                    .query_segment_info(&collection, timeout)
                    .await?;
                Ok(format::segment_info(&segments))
            }
        }
    }

    async fn list(&mut self, cmd: ListCommand) -> Result<String> {
        let service = self.service()?;
        match cmd {
            ListCommand::Collections => Ok(format::name_list(
                "Collection Name",
                &service.list_collections().await?,
            )),
            ListCommand::Partitions { collection } => Ok(format::name_list(
                "Partition Name",
                &service.list_partitions(&collection).await?,
            )),
            ListCommand::Indexes { collection } => {
                Ok(format::index_list(&service.list_indexes(&collection).await?))
            }
        }
    }

    async fn describe(&mut self, cmd: DescribeCommand) -> Result<String> {
        let service = self.service()?;
        match cmd {
            DescribeCommand::Collection { collection } => Ok(format::collection_details(
                &service.describe_collection(&collection).await?,
            )),
            DescribeCommand::Partition {
                collection,
                partition,
            } => Ok(format::partition_details(
                &collection,
                &service.describe_partition(&collection, &partition).await?,
            )),
            DescribeCommand::Index { collection, index } => {
                match service.describe_index(&collection, index.as_deref()).await? {
                    Some(details) => Ok(format::index_details(&details)),
                    None => Ok(format!("No index on collection {}.", collection)),
                }
            }
        }
    }

    async fn create(&mut self, cmd: CreateCommand) -> Result<String> {
        match cmd {
            CreateCommand::Alias {
                collection,
                aliases,
                alter,
                timeout,
            } => {
                let timeout = timeout_of(&timeout)?;
                let service = self.service()?;
                for alias in &aliases {
                    if alter {
                        service.alter_alias(&collection, alias, timeout).await?;
                    } else {
                        service.create_alias(&collection, alias, timeout).await?;
                    }
                }
                Ok(format!(
                    "{} alias {} for collection {}.",
                    if alter { "Altered" } else { "Created" },
                    aliases.join(", "),
                    collection
                ))
            }
            CreateCommand::Collection(args) => {
                let spec = validation::validate_collection_parameter(
                    &args.collection,
                    &args.primary_field,
                    &args.fields,
                )?
                .with_auto_id(args.auto_id)
                .with_description(args.description);
                let service = self.service()?;
                service.create_collection(&spec).await?;
                Ok(format!(
                    "Create collection successfully!\n{}",
                    format::collection_details(&service.describe_collection(&spec.name).await?)
                ))
            }
            CreateCommand::Partition {
                collection,
                partition,
                description,
            } => {
                let service = self.service()?;
                service
                    .create_partition(&collection, &partition, description.as_deref())
                    .await?;
                Ok(format::partition_details(
                    &collection,
                    &service.describe_partition(&collection, &partition).await?,
                ))
            }
            CreateCommand::Index(args) => {
                let spec = validation::validate_index_parameter(
                    &args.index_type,
                    &args.metric_type,
                    &args.params,
                )?;
                let timeout = timeout_of(&args.timeout)?;
                let service = self.service()?;
                service
                    .create_index(&args.collection, &args.field, &spec, timeout)
                    .await?;
                Ok(match service.describe_index(&args.collection, Some(&args.field)).await? {
                    Some(details) => format!("Create index successfully!\n{}", format::index_details(&details)),
                    None => "Create index successfully!".to_string(),
                })
            }
        }
    }

    async fn delete(&mut self, cmd: DeleteCommand) -> Result<String> {
        const ABORTED: &str = "Deletion cancelled.";
        match cmd {
            DeleteCommand::Alias { alias, timeout } => {
                let timeout = timeout_of(&timeout)?;
                self.service()?.drop_alias(&alias, timeout).await?;
                Ok(format!("Delete alias {} successfully!", alias))
            }
            DeleteCommand::Collection {
                collection,
                timeout,
                yes,
            } => {
                let timeout = timeout_of(&timeout)?;
                let service = self.service()?;
                if !self.confirmed(yes, &format!("collection {}", collection)) {
                    return Ok(ABORTED.to_string());
                }
                service.drop_collection(&collection, timeout).await?;
                Ok(format!("Delete collection {} successfully!", collection))
            }
            DeleteCommand::Partition {
                collection,
                partition,
                timeout,
                yes,
            } => {
                let timeout = timeout_of(&timeout)?;
                let service = self.service()?;
                if !self.confirmed(yes, &format!("partition {} of {}", partition, collection)) {
                    return Ok(ABORTED.to_string());
                }
                service.drop_partition(&collection, &partition, timeout).await?;
                Ok(format!("Delete partition {} successfully!", partition))
            }
            DeleteCommand::Index {
                collection,
                index,
                timeout,
                yes,
            } => {
                let timeout = timeout_of(&timeout)?;
                let service = self.service()?;
                let index_name = match index {
                    Some(name) => name,
                    None => service
                        .describe_index(&collection, None)
                        .await?
                        .map(|d| d.index_name)
                        .ok_or_else(|| {
                            CliError::remote("drop index", format!("collection {} has no index", collection))
                        })?,
                };
                if !self.confirmed(yes, &format!("index {} of {}", index_name, collection)) {
                    return Ok(ABORTED.to_string());
                }
                service.drop_index(&collection, &index_name, timeout).await?;
                Ok(format!("Delete index {} successfully!", index_name))
            }
            DeleteCommand::Entities {
                collection,
                expr,
                partition,
                timeout,
                yes,
            } => {
                if expr.trim().is_empty() {
                    return Err(ParameterError::EmptyExpression.into());
                }
                let timeout = timeout_of(&timeout)?;
                let service = self.service()?;
                if !self.confirmed(yes, &format!("entities of {} matching `{}`", collection, expr)) {
                    return Ok(ABORTED.to_string());
                }
                let deleted = service
                    .delete_entities(&collection, &expr, partition.as_deref(), timeout)
                    .await?;
                Ok(format!("Deleted {} entities from {}.", deleted, collection))
            }
        }
    }

    async fn search(&mut self, args: SearchArgs) -> Result<String> {
        let service = self.service()?;
        let index = service.describe_index(&args.collection, None).await?;
        let metric_type = args
            .metric_type
            .clone()
            .or_else(|| index.as_ref().map(|i| i.metric_type.clone()))
            .unwrap_or_default();
        let input = SearchInput {
            data: &args.data,
            anns_field: &args.anns_field,
            metric_type: &metric_type,
            params: &args.params,
            limit: &args.limit,
            expr: args.expr.as_deref(),
            partition_names: args.partitions.as_deref(),
            timeout: args.timeout.as_deref(),
            round_decimal: args.round_decimal.as_deref(),
            has_index: index.is_some(),
            index_type: index.as_ref().and_then(|i| i.index_type.parse().ok()),
            guarantee_timestamp: args.guarantee_timestamp.as_deref(),
            travel_timestamp: args.travel_timestamp.as_deref(),
        };
        let request =
            validation::validate_search_params(&input, self.config.fetch_timeout, self.progress.as_ref())
                .await?;
        let results = service.search(&args.collection, &request).await?;

        if let Some(path) = &args.export {
            let rows: Vec<Vec<Value>> = results
                .iter()
                .enumerate()
                .flat_map(|(i, hits)| {
                    hits.iter()
                        .map(move |hit| vec![json!(i), hit.id.clone(), json!(hit.distance)])
                })
                .collect();
            let headers = ["query", "id", "distance"].map(String::from);
            csv_io::write_csv_file(Path::new(path), &rows, &headers, self.progress.as_ref())?;
        }
        Ok(format::search_results(&results))
    }

    async fn query(&mut self, args: QueryArgs) -> Result<String> {
        let input = QueryInput {
            expr: &args.expr,
            partition_names: args.partitions.as_deref(),
            output_fields: args.output_fields.as_deref(),
            timeout: args.timeout.as_deref(),
            guarantee_timestamp: args.guarantee_timestamp.as_deref(),
            graceful_time: args.graceful_time.as_deref(),
            travel_timestamp: args.travel_timestamp.as_deref(),
        };
        let request = validation::validate_query_params(&input)?;
        let rows = self.service()?.query(&args.collection, &request).await?;

        if let Some(path) = &args.export {
            let headers = format::query_columns(&rows);
            let data: Vec<Vec<Value>> = rows
                .iter()
                .map(|row| {
                    headers
                        .iter()
                        .map(|h| row.get(h).cloned().unwrap_or(Value::Null))
                        .collect()
                })
                .collect();
            csv_io::write_csv_file(Path::new(path), &data, &headers, self.progress.as_ref())?;
        }
        Ok(format::query_results(&rows))
    }

    async fn import(&mut self, args: ImportArgs) -> Result<String> {
        let timeout = timeout_of(&args.timeout)?;
        let service = self.service()?;
        // Checked before reading so a large file is not parsed for nothing.
        if !service.has_collection(&args.collection).await? {
            return Err(CliError::remote(
                "import",
                format!("collection {} does not exist", args.collection),
            ));
        }
        let path = csv_io::strip_quotes(&args.path);
        let table = csv_io::read_csv_file(
            &path,
            true,
            self.config.fetch_timeout,
            self.progress.as_ref(),
        )
        .await?;
        info!(
            "Importing {} rows into {}",
            table.num_rows(),
            args.collection
        );
        let summary = service
            .insert(&args.collection, args.partition.as_deref(), &table, timeout)
            .await?;
        Ok(format::insert_summary(&args.collection, &summary))
    }

    async fn calc(&mut self, cmd: CalcCommand) -> Result<String> {
        match cmd {
            CalcCommand::Distance(args) => {
                let (left, right) = args.operands();
                let request = validation::validate_calc_params(
                    &left,
                    &right,
                    &args.metric_type,
                    Some(args.sqrt),
                    args.dim,
                    args.timeout.as_deref(),
                )?;
                let matrix = self.service()?.calc_distance(&request).await?;
                Ok(format::distance_results(&matrix))
            }
            CalcCommand::MktsFromHybridts {
                hybridts,
                milliseconds,
            } => {
                let ts = validation::validate_hybrid_timestamp(&hybridts)?;
                let ms = validation::validate_milliseconds(milliseconds.as_deref())?;
                Ok(timestamp::mkts_from_hybridts(ts, ms)?.to_string())
            }
            CalcCommand::MktsFromUnixtime {
                epoch,
                milliseconds,
            } => {
                let epoch = validation::validate_unix_epoch(&epoch)?;
                let ms = validation::validate_milliseconds(milliseconds.as_deref())?;
                Ok(timestamp::mkts_from_unixtime(epoch, ms)?.to_string())
            }
            CalcCommand::HybridtsToUnixtime { hybridts } => {
                let ts = validation::validate_hybrid_timestamp(&hybridts)?;
                Ok(timestamp::hybridts_to_unixtime(ts).to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_line_keeps_quoted_spans() {
        assert_eq!(
            split_line(r#"search -c car -d "[[1.0, 2.0]]" -l 2"#).unwrap(),
            vec!["search", "-c", "car", "-d", "[[1.0, 2.0]]", "-l", "2"]
        );
        assert_eq!(
            split_line(r#"calc distance --left-vectors "[b'\x94', b'N']""#).unwrap()[3],
            r"[b'\x94', b'N']"
        );
        assert_eq!(split_line("  ").unwrap(), Vec::<String>::new());
        assert_eq!(split_line("a ''").unwrap(), vec!["a", ""]);
        assert!(split_line("query -e 'id > 1").is_err());
    }

    #[test]
    fn connect_accepts_short_host_flag() {
        let parsed = ShellLine::try_parse_from(["connect", "-h", "10.0.0.1", "-p", "19531"]).unwrap();
        match parsed.command {
            Command::Connect(args) => {
                assert_eq!(args.host.as_deref(), Some("10.0.0.1"));
                assert_eq!(args.port, Some(19531));
                assert!(!args.disconnect);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn list_flags_split_at_the_boundary() {
        let parsed = ShellLine::try_parse_from([
            "create", "index", "-c", "car", "-f", "vector", "-t", "IVF_FLAT", "-m", "L2", "-p",
            "nlist:128,m:4",
        ])
        .unwrap();
        match parsed.command {
            Command::Create(CreateCommand::Index(args)) => {
                assert_eq!(args.params, vec!["nlist:128", "m:4"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn snake_case_subcommands_parse() {
        assert!(ShellLine::try_parse_from(["show", "loading_progress", "-c", "car"]).is_ok());
        assert!(ShellLine::try_parse_from(["calc", "hybridts_to_unixtime", "--hybridts", "1"]).is_ok());
        assert!(ShellLine::try_parse_from(["load_balance", "-s", "1"]).is_ok());
    }

    #[test]
    fn timeout_flag_must_be_numeric() {
        assert_eq!(timeout_of(&None), Ok(None));
        assert_eq!(timeout_of(&Some("2.5".into())), Ok(Some(2.5)));
        assert_eq!(
            timeout_of(&Some("soon".into())),
            Err(ParameterError::InvalidTimeout("soon".into()))
        );
        for raw in ["-1", "1e300", "inf", "NaN"] {
            assert_eq!(
                timeout_of(&Some(raw.into())),
                Err(ParameterError::InvalidTimeout(raw.into())),
                "{}",
                raw
            );
        }
    }

    #[tokio::test]
    async fn timestamp_commands_need_no_connection() {
        let mut session = Session::new(CliConfig::default());
        let out = session
            .run_line("calc hybridts_to_unixtime --hybridts 429164525386203142")
            .await
            .unwrap();
        assert_eq!(out, Outcome::Output("1637132741.494".to_string()));

        let out = session
            .run_line("calc mkts_from_unixtime --epoch 1 --milliseconds 500")
            .await
            .unwrap();
        assert_eq!(out, Outcome::Output((1500u64 << 18).to_string()));

        let err = session
            .run_line("calc mkts_from_unixtime --epoch 1e17")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CliError::Parameter(ParameterError::InvalidNumber { name: "epoch", .. })
        ));
    }

    #[tokio::test]
    async fn data_commands_require_a_connection() {
        let mut session = Session::new(CliConfig::default());
        let err = session.run_line("list collections").await.unwrap_err();
        assert!(matches!(err, CliError::NotConnected(alias) if alias == "default"));
    }

    #[tokio::test]
    async fn usage_errors_and_help() {
        let mut session = Session::new(CliConfig::default());
        assert!(matches!(
            session.run_line("frobnicate").await,
            Err(CliError::Usage(_))
        ));
        assert!(matches!(
            session.run_line("help").await,
            Ok(Outcome::Output(text)) if text.contains("search")
        ));
        assert_eq!(session.run_line("exit").await.unwrap(), Outcome::Exit);
    }
}
