//! warmview - command line entry point
//!
//! Exercises the interception policy and the caching proxy without an
//! embedded engine.

use std::env;
use std::path::PathBuf;
use std::process;

use warmview::utils::logging;
use warmview::{
    CachingHttpProxy, Config, InterceptedRequest, InterceptionPolicy, NAME, RequestInterceptor,
    VERSION,
};

fn usage() {
    eprintln!("{} v{}", NAME, VERSION);
    eprintln!();
    eprintln!("usage:");
    eprintln!("  {} [--config <file>] policy <url> [method] [--main-frame]", NAME);
    eprintln!("  {} [--config <file>] fetch <url>", NAME);
    eprintln!("  {} --version", NAME);
}

fn main() {
    let mut args: Vec<String> = env::args().skip(1).collect();

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("{} {}", NAME, VERSION);
        return;
    }

    let mut config_path = None;
    if let Some(pos) = args.iter().position(|a| a == "--config") {
        if pos + 1 >= args.len() {
            usage();
            process::exit(2);
        }
        config_path = Some(PathBuf::from(args.remove(pos + 1)));
        args.remove(pos);
    }

    let (config, source) = Config::discover_with_source(config_path.as_deref());
    logging::init(logging::level_from_str(&config.log_level.0));
    source.log();

    let code = match args.first().map(String::as_str) {
        Some("policy") => run_policy(&args[1..]),
        Some("fetch") => run_fetch(&config, &args[1..]),
        _ => {
            usage();
            2
        }
    };
    process::exit(code);
}

fn run_policy(args: &[String]) -> i32 {
    let main_frame = args.iter().any(|a| a == "--main-frame");
    let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();

    let Some(url) = positional.first() else {
        usage();
        return 2;
    };
    let method = positional.get(1).map(|m| m.as_str()).unwrap_or("GET");

    let request = InterceptedRequest::get(url.as_str())
        .with_method(method)
        .main_frame(main_frame);
    let proxied = InterceptionPolicy.should_proxy(&request);

    println!(
        "{} {} (extension {:?}, main frame: {}) -> {}",
        method,
        url,
        request.extension(),
        main_frame,
        if proxied { "proxy" } else { "engine" }
    );
    0
}

fn run_fetch(config: &Config, args: &[String]) -> i32 {
    let Some(url) = args.first() else {
        usage();
        return 2;
    };

    let proxy = match CachingHttpProxy::from_config(&config.proxy) {
        Ok(proxy) => proxy,
        Err(e) => {
            eprintln!("failed to create proxy: {}", e);
            return 1;
        }
    };
    let interceptor = RequestInterceptor::new(proxy);

    let request = InterceptedRequest::get(url.as_str());
    let Some(response) = interceptor.intercept(&request) else {
        println!("not intercepted: the engine would load {} itself", url);
        return 0;
    };

    println!("{} {}", response.status(), response.reason());
    println!("mime-type: {}; charset: {}", response.mime_type(), response.charset());
    let mut headers: Vec<_> = response.headers().iter().collect();
    headers.sort();
    for (name, value) in headers {
        println!("{}: {}", name, value);
    }

    match response.read_body() {
        Ok(body) => {
            println!();
            println!("{} bytes", body.len());
            if let Some(stats) = interceptor.proxy().cache_stats() {
                println!(
                    "cache: {} entries, {} / {} bytes",
                    stats.entries, stats.size_bytes, stats.max_size_bytes
                );
            }
            0
        }
        Err(e) => {
            eprintln!("failed to read body: {}", e);
            1
        }
    }
}
