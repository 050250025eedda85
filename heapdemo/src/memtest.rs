/// Raw allocation workload: fill a block, grow it, check the contents moved
/// with it, then check alignment and block reuse.
use std::io::Write;
use std::ptr;
use std::slice;

use bestfit::constants::ALLOC_ALIGN_BYTES;
use bestfit::{AllocRaw, RawPtr};

use crate::error::{err_check, DemoError};

const INITIAL_SIZE: usize = 24;
const GROWN_SIZE: usize = 48;

fn report_alignment<W: Write>(out: &mut W, name: &str, ptr: RawPtr<u8>) -> Result<(), DemoError> {
    writeln!(out, "{} = {:p}", name, ptr)?;

    if ptr.as_word() % ALLOC_ALIGN_BYTES == 0 {
        writeln!(out, "  {} is double-word aligned", name)?;
        Ok(())
    } else {
        Err(err_check(&format!("{} is not double-word aligned", name)))
    }
}

pub fn run<A: AllocRaw, W: Write>(heap: &mut A, out: &mut W) -> Result<(), DemoError> {
    // initial allocation
    let x = heap.allocate(INITIAL_SIZE)?;
    let original: Vec<u8> = (0..INITIAL_SIZE as u8).map(|i| i * 2).collect();
    unsafe { ptr::copy_nonoverlapping(original.as_ptr(), x.as_ptr(), INITIAL_SIZE) };

    // growing moves the block
    let a = heap
        .resize(Some(x), GROWN_SIZE)?
        .ok_or_else(|| err_check("resize returned no block"))?;
    let grown = unsafe { slice::from_raw_parts(a.as_ptr(), INITIAL_SIZE) };

    write!(out, "first {} bytes after resize:", INITIAL_SIZE)?;
    for byte in grown {
        write!(out, " {}", byte)?;
    }
    writeln!(out)?;

    if grown != &original[..] {
        return Err(err_check("resize did not preserve the block contents"));
    }
    writeln!(out, "resize preserved the block contents")?;

    // shrinking doesn't
    if heap.resize(Some(a), INITIAL_SIZE)? != Some(a) {
        return Err(err_check("shrinking resize moved the block"));
    }

    let y = heap.allocate(19)?;
    let z = heap.allocate(32)?;

    report_alignment(out, "x", a)?;
    report_alignment(out, "y", y)?;
    report_alignment(out, "z", z)?;

    // a freed block comes straight back for the same request
    heap.deallocate(Some(y));
    if heap.allocate(19)? != y {
        return Err(err_check("freed block was not reused"));
    }
    writeln!(out, "freed block reused at {:p}", y)?;

    heap.deallocate(Some(y));
    heap.deallocate(Some(z));
    heap.deallocate(Some(a));

    Ok(())
}
