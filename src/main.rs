use std::fs;
use std::io;
use std::path;
use std::process;
use std::time::Duration;

use bytesize::ByteSize;
use clap::ArgEnum;
use env_logger;
use log;

use netsort::{
    Node, NodeConfig, QueueCapacity, RecordBufferBuilder, RecordSorterBuilder, RetryPolicy, ShuffleConfig, Topology,
};

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let server_id: usize = arg_parser.value_of_t_or_exit("server_id");
    let input = arg_parser.value_of("input").expect("value is required");
    let output = arg_parser.value_of("output").expect("value is required");
    let config = arg_parser.value_of("config").expect("value is required");

    let tmp_dir: Option<&str> = arg_parser.value_of("tmp_dir");
    let threads: Option<usize> = arg_parser
        .is_present("threads")
        .then(|| arg_parser.value_of_t_or_exit("threads"));
    let chunk_size: Option<ByteSize> = arg_parser
        .is_present("chunk_size")
        .then(|| arg_parser.value_of_t_or_exit("chunk_size"));
    let queue_capacity: Option<usize> = arg_parser
        .is_present("queue_capacity")
        .then(|| arg_parser.value_of_t_or_exit("queue_capacity"));
    let retry_backoff: u64 = arg_parser.value_of_t_or_exit("retry_backoff");

    log::info!("starting server {}", server_id);

    let topology = match Topology::load(path::Path::new(config)) {
        Ok(topology) => topology,
        Err(err) => {
            log::error!("topology loading error: {}", err);
            process::exit(1);
        }
    };

    let mut shuffle_config = ShuffleConfig::new(server_id, topology)
        .with_retry(RetryPolicy::unbounded(Duration::from_millis(retry_backoff)));
    if let Some(queue_capacity) = queue_capacity {
        shuffle_config = shuffle_config.with_queue_capacity(QueueCapacity::Bounded(queue_capacity));
    }

    let mut sorter_builder = RecordSorterBuilder::new();
    if let Some(threads) = threads {
        sorter_builder = sorter_builder.with_threads_number(threads);
    }

    if let Some(tmp_dir) = tmp_dir {
        sorter_builder = sorter_builder.with_tmp_dir(path::Path::new(tmp_dir));
    }

    if let Some(chunk_size) = chunk_size {
        sorter_builder = sorter_builder.with_buffer(RecordBufferBuilder::with_byte_limit(chunk_size.as_u64()));
    }

    let node = match Node::new(NodeConfig::new(shuffle_config).with_sorter(sorter_builder)) {
        Ok(node) => node,
        Err(err) => {
            log::error!("server initialization error: {}", err);
            process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            log::error!("runtime initialization error: {}", err);
            process::exit(1);
        }
    };

    let listener = match runtime.block_on(node.bind()) {
        Ok(listener) => listener,
        Err(err) => {
            log::error!("listener error: {}", err);
            process::exit(1);
        }
    };

    let input_stream = match fs::File::open(input) {
        Ok(file) => io::BufReader::new(file),
        Err(err) => {
            log::error!("input file opening error: {}", err);
            process::exit(1);
        }
    };

    let buckets = match node.partition(input_stream) {
        Ok(buckets) => buckets,
        Err(err) => {
            log::error!("input partitioning error: {}", err);
            process::exit(1);
        }
    };

    let records = match runtime.block_on(node.shuffle(listener, buckets)) {
        Ok(records) => records,
        Err(err) => {
            log::error!("{}", err);
            process::exit(1);
        }
    };

    let mut output_stream = match fs::File::create(output) {
        Ok(file) => io::BufWriter::new(file),
        Err(err) => {
            log::error!("output file creation error: {}", err);
            process::exit(1);
        }
    };

    if let Err(err) = node.sort_and_emit(records, &mut output_stream) {
        log::error!("{}", err);
        process::exit(1);
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("netsort")
        .about("distributed external sorter")
        .arg(
            clap::Arg::new("server_id")
                .help("id of this server in the topology")
                .required(true)
                .index(1)
                .validator(|v| match v.parse::<usize>() {
                    Ok(_) => Ok(()),
                    Err(err) => Err(format!("server id must be an integer: {}", err)),
                }),
        )
        .arg(
            clap::Arg::new("input")
                .help("file holding this server's part of the dataset")
                .required(true)
                .index(2),
        )
        .arg(
            clap::Arg::new("output")
                .help("file receiving this server's sorted partition")
                .required(true)
                .index(3),
        )
        .arg(
            clap::Arg::new("config")
                .help("cluster topology file (yaml)")
                .required(true)
                .index(4),
        )
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(LogLevel::possible_values()),
        )
        .arg(
            clap::Arg::new("threads")
                .short('t')
                .long("threads")
                .help("number of threads to use for parallel sorting")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("tmp_dir")
                .short('d')
                .long("tmp-dir")
                .help("directory to be used to store temporary data")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("chunk_size")
                .short('c')
                .long("chunk-size")
                .help("in-memory sort buffer size, larger partitions are sorted in external chunks")
                .takes_value(true)
                .validator(|v| match v.parse::<ByteSize>() {
                    Ok(_) => Ok(()),
                    Err(err) => Err(format!("Chunk size format incorrect: {}", err)),
                }),
        )
        .arg(
            clap::Arg::new("retry_backoff")
                .short('r')
                .long("retry-backoff-ms")
                .help("delay between two attempts to connect a peer, in milliseconds")
                .takes_value(true)
                .default_value("1000"),
        )
        .arg(
            clap::Arg::new("queue_capacity")
                .short('q')
                .long("queue-capacity")
                .help("inbound frame queue capacity, unbounded if not set")
                .takes_value(true),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}
