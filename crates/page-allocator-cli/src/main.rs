//! Drive a page allocator with the reference geometry from the command line.

use std::process;

use argh::FromArgs;
use page_allocator::{DEFAULT_PAGE_COUNT, DEFAULT_PAGE_SIZE, LockedPageAllocator};
use snafu::{Report, ResultExt as _, Whatever};

use self::{
    log::{AllocatorLog, LogLevel},
    script::{Request, Session},
};

#[macro_use]
mod log;
mod script;

static HEAP: LockedPageAllocator<DEFAULT_PAGE_COUNT, DEFAULT_PAGE_SIZE> =
    LockedPageAllocator::new();
static HEAP_LOG: AllocatorLog = AllocatorLog;

/// Run allocation requests against a 16 page arena of 4096 byte pages.
///
/// Requests are `alloc:SIZE`, `realloc:SLOT:SIZE`, `free:SLOT`,
/// `fill:SLOT:BYTE` and `check:SLOT:BYTE[:LEN]`. Without requests a built-in
/// scenario runs.
#[derive(Debug, FromArgs)]
struct Args {
    /// requests to run in order
    #[argh(positional)]
    requests: Vec<Request>,
    /// log every allocator call
    #[argh(switch, short = 'v')]
    verbose: bool,
    /// only log errors
    #[argh(switch, short = 'q')]
    quiet: bool,
    /// print the page table after every request
    #[argh(switch)]
    dump: bool,
}

fn main() {
    let args: Args = argh::from_env();

    log::set_max_level(match (args.verbose, args.quiet) {
        (true, _) => LogLevel::Trace,
        (false, true) => LogLevel::Error,
        (false, false) => LogLevel::Info,
    });

    if let Err(err) = run(&args) {
        let report = Report::from_error(err);
        eprintln!("{report}");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Whatever> {
    let requests = if args.requests.is_empty() {
        script::reference_scenario()
    } else {
        args.requests.clone()
    };

    HEAP.set_logger(&HEAP_LOG);
    let mut heap = HEAP.lock();
    heap.initialize();

    let mut session = Session::new(&mut *heap);
    for request in requests {
        trace!("request {request}");
        match session.apply(request) {
            Ok(()) => {}
            Err(err) if err.is_out_of_memory() => warn!("{request}: {err}"),
            Err(err) => {
                return Err(err).with_whatever_context(|_| format!("request `{request}` failed"));
            }
        }
        if args.dump {
            script::dump(session.allocator());
        }
    }

    let usage = session.allocator().usage();
    info!(
        "done: {} pages used, {} free, {} payload bytes",
        usage.used_pages, usage.free_pages, usage.payload_bytes
    );
    Ok(())
}
