//! Allocation requests driven from the command line.
//!
//! Each request is written as `op:arg[:arg...]`:
//!
//! | request                    | effect                                         |
//! |----------------------------|------------------------------------------------|
//! | `alloc:SIZE`               | allocate `SIZE` bytes into the next slot       |
//! | `realloc:SLOT:SIZE`        | resize the allocation held by `SLOT`           |
//! | `free:SLOT`                | release the allocation held by `SLOT`          |
//! | `fill:SLOT:BYTE`           | overwrite the payload of `SLOT` with `BYTE`    |
//! | `check:SLOT:BYTE[:LEN]`    | verify the first `LEN` payload bytes of `SLOT` |
//!
//! Numbers are decimal or `0x`-prefixed hexadecimal. Slots are numbered in
//! allocation order and stay empty once freed.

use core::{fmt, num::ParseIntError, ptr::NonNull, str::FromStr};

use arrayvec::ArrayVec;
use page_allocator::{AllocError, DEFAULT_PAGE_SIZE, Location, PageAllocator};
use snafu::{OptionExt as _, ResultExt as _, Snafu, ensure};

/// Maximum number of allocations a session can track.
pub const MAX_SLOTS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Alloc { size: usize },
    Realloc { slot: usize, size: usize },
    Free { slot: usize },
    Fill { slot: usize, byte: u8 },
    Check { slot: usize, byte: u8, len: Option<usize> },
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Alloc { size } => write!(f, "alloc:{size}"),
            Self::Realloc { slot, size } => write!(f, "realloc:{slot}:{size}"),
            Self::Free { slot } => write!(f, "free:{slot}"),
            Self::Fill { slot, byte } => write!(f, "fill:{slot}:{byte:#04x}"),
            Self::Check {
                slot,
                byte,
                len: None,
            } => write!(f, "check:{slot}:{byte:#04x}"),
            Self::Check {
                slot,
                byte,
                len: Some(len),
            } => write!(f, "check:{slot}:{byte:#04x}:{len}"),
        }
    }
}

#[derive(Debug, Snafu)]
pub enum ParseRequestError {
    #[snafu(display("unknown request `{op}`"))]
    UnknownOp { op: String },
    #[snafu(display("`{op}` takes {expected} argument(s), got {actual}"))]
    Arity {
        op: &'static str,
        expected: &'static str,
        actual: usize,
    },
    #[snafu(display("invalid number `{value}`"))]
    Number {
        value: String,
        #[snafu(source)]
        source: ParseIntError,
    },
    #[snafu(display("byte value out of range: {value}"))]
    ByteRange { value: usize },
}

fn parse_number(value: &str) -> Result<usize, ParseRequestError> {
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.context(NumberSnafu { value })
}

fn parse_byte(value: &str) -> Result<u8, ParseRequestError> {
    let value = parse_number(value)?;
    u8::try_from(value).ok().context(ByteRangeSnafu { value })
}

impl FromStr for Request {
    type Err = ParseRequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.split(':');
        let op = fields.next().unwrap_or_default();
        let args: Vec<&str> = fields.collect();

        let arity = |op: &'static str,
                     expected: &'static str,
                     ok: bool|
         -> Result<(), ParseRequestError> {
            ensure!(
                ok,
                AritySnafu {
                    op,
                    expected,
                    actual: args.len(),
                }
            );
            Ok(())
        };

        let request = match op {
            "alloc" => {
                arity("alloc", "1", args.len() == 1)?;
                Self::Alloc {
                    size: parse_number(args[0])?,
                }
            }
            "realloc" => {
                arity("realloc", "2", args.len() == 2)?;
                Self::Realloc {
                    slot: parse_number(args[0])?,
                    size: parse_number(args[1])?,
                }
            }
            "free" => {
                arity("free", "1", args.len() == 1)?;
                Self::Free {
                    slot: parse_number(args[0])?,
                }
            }
            "fill" => {
                arity("fill", "2", args.len() == 2)?;
                Self::Fill {
                    slot: parse_number(args[0])?,
                    byte: parse_byte(args[1])?,
                }
            }
            "check" => {
                arity("check", "2 or 3", matches!(args.len(), 2 | 3))?;
                Self::Check {
                    slot: parse_number(args[0])?,
                    byte: parse_byte(args[1])?,
                    len: args.get(2).map(|len| parse_number(len)).transpose()?,
                }
            }
            _ => return UnknownOpSnafu { op }.fail(),
        };
        Ok(request)
    }
}

/// Requests run when none are given on the command line.
///
/// Two small allocations, a free that leaves a one-page hole, a four-page
/// allocation that has to skip the hole, and an in-place grow of it.
#[must_use]
pub fn reference_scenario() -> Vec<Request> {
    let big = 3 * DEFAULT_PAGE_SIZE + 1;
    vec![
        Request::Alloc { size: 100 },
        Request::Alloc { size: 100 },
        Request::Free { slot: 0 },
        Request::Alloc { size: big },
        Request::Fill { slot: 2, byte: 0x5a },
        Request::Realloc {
            slot: 2,
            size: 5 * DEFAULT_PAGE_SIZE - 100,
        },
        Request::Check {
            slot: 2,
            byte: 0x5a,
            len: Some(big),
        },
        Request::Free { slot: 1 },
        Request::Free { slot: 2 },
    ]
}

#[derive(Debug, Snafu)]
pub enum SessionError {
    #[snafu(display("slot {slot} does not hold an allocation"))]
    EmptySlot {
        slot: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("all {MAX_SLOTS} slots are in use"))]
    SlotsFull {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("allocator rejected the request: {source}"))]
    Allocator {
        #[snafu(implicit)]
        location: Location,
        #[snafu(source)]
        source: AllocError,
    },
    #[snafu(display("slot {slot} holds {size} bytes, cannot check {len}"))]
    CheckTooLong {
        slot: usize,
        size: usize,
        len: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("slot {slot} byte {offset} is {actual:#04x}, expected {expected:#04x}"))]
    Mismatch {
        slot: usize,
        offset: usize,
        actual: u8,
        expected: u8,
        #[snafu(implicit)]
        location: Location,
    },
}

impl SessionError {
    /// Returns `true` if the allocator ran out of pages.
    ///
    /// A session keeps going after such a failure; the allocator is left
    /// unchanged.
    #[must_use]
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::Allocator { source, .. } if source.is_out_of_memory())
    }
}

/// Applies requests to an allocator, tracking live allocations by slot.
pub struct Session<'a, const P: usize, const C: usize> {
    allocator: &'a mut PageAllocator<P, C>,
    slots: ArrayVec<Option<NonNull<u8>>, MAX_SLOTS>,
}

impl<'a, const P: usize, const C: usize> Session<'a, P, C> {
    #[must_use]
    pub fn new(allocator: &'a mut PageAllocator<P, C>) -> Self {
        Self {
            allocator,
            slots: ArrayVec::new(),
        }
    }

    #[must_use]
    pub fn allocator(&self) -> &PageAllocator<P, C> {
        self.allocator
    }

    fn slot(&self, slot: usize) -> Result<NonNull<u8>, SessionError> {
        self.slots
            .get(slot)
            .copied()
            .flatten()
            .context(EmptySlotSnafu { slot })
    }

    pub fn apply(&mut self, request: Request) -> Result<(), SessionError> {
        match request {
            Request::Alloc { size } => {
                ensure!(!self.slots.is_full(), SlotsFullSnafu);
                let ptr = self.allocator.alloc(size).context(AllocatorSnafu)?;
                self.report(self.slots.len(), ptr)?;
                self.slots.push(Some(ptr));
            }
            Request::Realloc { slot, size } => {
                let ptr = self.slot(slot)?;
                let ptr = self.allocator.realloc(ptr, size).context(AllocatorSnafu)?;
                self.report(slot, ptr)?;
                self.slots[slot] = Some(ptr);
            }
            Request::Free { slot } => {
                let ptr = self.slot(slot)?;
                self.allocator.free(ptr).context(AllocatorSnafu)?;
                info!("slot {slot}: released");
                self.slots[slot] = None;
            }
            Request::Fill { slot, byte } => {
                let ptr = self.slot(slot)?;
                self.allocator
                    .payload_mut(ptr)
                    .context(AllocatorSnafu)?
                    .fill(byte);
            }
            Request::Check { slot, byte, len } => {
                let ptr = self.slot(slot)?;
                let payload = self.allocator.payload(ptr).context(AllocatorSnafu)?;
                let len = len.unwrap_or(payload.len());
                ensure!(
                    len <= payload.len(),
                    CheckTooLongSnafu {
                        slot,
                        size: payload.len(),
                        len,
                    }
                );
                if let Some((offset, &actual)) =
                    payload[..len].iter().enumerate().find(|&(_, &b)| b != byte)
                {
                    return MismatchSnafu {
                        slot,
                        offset,
                        actual,
                        expected: byte,
                    }
                    .fail();
                }
                info!("slot {slot}: {len} bytes match {byte:#04x}");
            }
        }
        Ok(())
    }

    fn report(&self, slot: usize, ptr: NonNull<u8>) -> Result<(), SessionError> {
        let run = self.allocator.run(ptr).context(AllocatorSnafu)?;
        info!(
            "slot {slot}: {} bytes at {ptr:p}, pages {}..={}",
            run.size(),
            run.start(),
            run.last()
        );
        Ok(())
    }
}

/// Prints the descriptor table and the live runs.
pub fn dump<const P: usize, const C: usize>(allocator: &PageAllocator<P, C>) {
    println!("page  used  cont");
    for (index, desc) in allocator.descriptors().iter().enumerate() {
        let cont = if desc.is_continuation() { "yes" } else { "-" };
        println!("{index:>4} {:>5}  {cont:>4}", desc.used_size());
    }
    for run in allocator.runs() {
        println!(
            "run {}..={} ({} pages, {} bytes)",
            run.start(),
            run.last(),
            run.page_count(),
            run.size()
        );
    }
    let usage = allocator.usage();
    println!(
        "{} of {} pages used, {} payload bytes",
        usage.used_pages,
        P,
        usage.payload_bytes
    );
}
