/// Collector workloads: a doubly linked list that is cut apart between
/// collections, and an array of pointers to boxed integers.
use std::io::Write;
use std::mem::{offset_of, size_of};
use std::ptr;

use bestfit::{CollectionStats, GcHeap, HeapConfig, ObjectLayout, RawPtr};

use crate::error::{err_check, DemoError};

#[repr(C)]
struct Link {
    value: i64,
    next: *mut Link,
    prev: *mut Link,
}

fn link_layout() -> Result<ObjectLayout, DemoError> {
    Ok(ObjectLayout::new(
        size_of::<Link>(),
        vec![offset_of!(Link, next), offset_of!(Link, prev)],
    )?)
}

fn new_link<'l>(
    gc: &mut GcHeap<'l>,
    layout: &'l ObjectLayout,
    value: i64,
) -> Result<*mut Link, DemoError> {
    let link = gc.allocate_typed(layout)?.cast::<Link>().as_ptr();
    unsafe { (*link).value = value };
    Ok(link)
}

/// Push `new_link` on the front of the list, returning the new head
unsafe fn add(head: *mut Link, new_link: *mut Link) -> *mut Link {
    (*new_link).prev = ptr::null_mut();
    if !head.is_null() {
        (*head).prev = new_link;
    }
    (*new_link).next = head;
    new_link
}

/// Unlink `current` from its neighbours, returning the link after it
unsafe fn del(current: *mut Link) -> *mut Link {
    let next = (*current).next;
    let prev = (*current).prev;

    if !next.is_null() {
        (*next).prev = prev;
    }
    if !prev.is_null() {
        (*prev).next = next;
    }

    next
}

unsafe fn print_list<W: Write>(out: &mut W, label: &str, head: *mut Link) -> Result<usize, DemoError> {
    writeln!(out, "{}", label)?;

    let mut count = 0;
    let mut current = head;
    while !current.is_null() {
        writeln!(out, "\tvalue = {}\tlink @{:p}", (*current).value, current)?;
        count += 1;
        current = (*current).next;
    }

    Ok(count)
}

/// Root `head`, collect, and check that exactly `expected` blocks survived.
fn collect_from(
    gc: &mut GcHeap<'_>,
    head: *mut Link,
    expected: usize,
) -> Result<CollectionStats, DemoError> {
    gc.root_insert(RawPtr::from_ptr(head as *const u8));
    let stats = gc.collect();

    let live = gc.heap().stats().allocated_blocks;
    if live != expected {
        return Err(err_check(&format!(
            "{} blocks survived collection, expected {}",
            live, expected
        )));
    }

    Ok(stats)
}

fn check_len(label: &str, len: usize, expected: usize) -> Result<(), DemoError> {
    if len == expected {
        Ok(())
    } else {
        Err(err_check(&format!(
            "{}: list has {} links, expected {}",
            label, len, expected
        )))
    }
}

pub fn run_list<W: Write>(config: HeapConfig, num_objs: usize, out: &mut W) -> Result<(), DemoError> {
    if num_objs < 2 {
        return Err(err_check("the list workload needs at least 2 objects"));
    }

    let layout = link_layout()?;
    let mut gc = GcHeap::with_config(config);

    unsafe {
        // Create a list of arbitrary integers.
        let mut head: *mut Link = ptr::null_mut();
        for i in 0..num_objs {
            let link = new_link(&mut gc, &layout, i as i64)?;
            head = add(head, link);
        }

        // Show everything, collect, and then show it all again.
        print_list(out, "Initial:", head)?;
        collect_from(&mut gc, head, num_objs)?;
        let len = print_list(out, "Collected:", head)?;
        check_len("Collected", len, num_objs)?;

        // Remove the first element, collect, and then add a new one.
        head = (*head).next;
        (*head).prev = ptr::null_mut();
        let stats = collect_from(&mut gc, head, num_objs - 1)?;
        writeln!(out, "\t({} link swept)", stats.swept)?;

        let link = new_link(&mut gc, &layout, num_objs as i64)?;
        head = add(head, link);
        let len = print_list(out, "Pop and push:", head)?;
        check_len("Pop and push", len, num_objs)?;

        // Walk halfway into the list, and make that the start of the new
        // list.
        let mut current = head;
        for _ in 0..num_objs / 2 {
            current = (*current).next;
        }
        (*current).prev = ptr::null_mut();
        head = current;

        let remaining = num_objs - num_objs / 2;
        collect_from(&mut gc, head, remaining)?;
        let len = print_list(out, "Disconnected:", head)?;
        check_len("Disconnected", len, remaining)?;

        // Remove every other link.
        let mut current = head;
        let mut i = 0;
        while !current.is_null() {
            if i % 2 == 0 {
                current = (*current).next;
            } else {
                current = del(current);
            }
            i += 1;
        }

        let remaining = (remaining + 1) / 2;
        collect_from(&mut gc, head, remaining)?;
        let len = print_list(out, "Every other:", head)?;
        check_len("Every other", len, remaining)?;
    }

    // Empty root set.
    let stats = gc.collect();
    writeln!(out, "Empty root set: {} links swept", stats.swept)?;
    if gc.heap().stats().allocated_blocks != 0 {
        return Err(err_check("blocks survived a collection with no roots"));
    }

    Ok(())
}

pub fn run_array<W: Write>(config: HeapConfig, num_objs: usize, out: &mut W) -> Result<(), DemoError> {
    let int_layout = ObjectLayout::leaf(size_of::<i32>())?;
    let array_layout = ObjectLayout::pointer_array(num_objs)?;
    let mut gc = GcHeap::with_config(config);

    let array = gc.allocate_typed(&array_layout)?.cast::<*mut i32>();
    for i in 0..num_objs {
        let int = gc.allocate_typed(&int_layout)?.cast::<i32>().as_ptr();
        unsafe {
            *int = i as i32;
            *array.as_ptr().add(i) = int;
        }
    }

    gc.root_insert(Some(array.cast()));
    let stats = gc.collect();
    writeln!(out, "Rooted array: {} objects marked", stats.marked)?;

    if stats.swept != 0 || stats.marked != num_objs + 1 {
        return Err(err_check("objects reachable from the array were collected"));
    }
    for i in 0..num_objs {
        let value = unsafe { **array.as_ptr().add(i) };
        if value != i as i32 {
            return Err(err_check(&format!("element {} holds {}", i, value)));
        }
    }

    let stats = gc.collect();
    writeln!(out, "Empty root set: {} objects swept", stats.swept)?;
    if stats.swept != num_objs + 1 {
        return Err(err_check("unrooted objects survived collection"));
    }

    writeln!(out, "gcarray ran properly. All looks good")?;
    Ok(())
}
