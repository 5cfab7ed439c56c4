//! Example of sharing a `SharedDynamicArray` between threads.
//!
//! Several producers append to the same array concurrently. Each push takes the lock for the
//! duration of the call, so no values are lost even while the buffer is being reallocated.

use std::thread;

use dynamic_array::{ArrayAccess, DynamicArray, Result, SharedDynamicArray};
use new_zealand::nz;

const PRODUCERS: u64 = 4;
const VALUES_PER_PRODUCER: u64 = 1_000;

/// Works with either array flavor.
fn sum(array: &impl ArrayAccess<u64>) -> Result<u64> {
    let mut total: u64 = 0;

    for index in 0..array.len() {
        total = total.wrapping_add(array.read(index)?);
    }

    Ok(total)
}

fn main() -> Result<()> {
    let array: SharedDynamicArray<u64> = DynamicArray::builder()
        .initial_capacity(nz!(4))
        .build_shared()?;

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let array = array.clone();
            thread::spawn(move || -> Result<()> {
                for value in 0..VALUES_PER_PRODUCER {
                    array.push(producer.wrapping_mul(VALUES_PER_PRODUCER).wrapping_add(value))?;
                }

                Ok(())
            })
        })
        .collect();

    for producer in producers {
        producer.join().expect("producer thread panicked")?;
    }

    println!(
        "{} values pushed, capacity grew from 4 to {}",
        array.len(),
        array.capacity()
    );

    let total = sum(&array)?;
    println!("Sum of all values: {total}");

    let mut local = DynamicArray::<u64>::new()?;
    while let Some(value) = array.pop()? {
        if value.checked_rem(500) == Some(0) {
            local.push(value)?;
        }
    }

    println!(
        "Moved {} multiples of 500 into a local array, sum {}",
        local.len(),
        sum(&local)?
    );

    array.release_all();

    Ok(())
}
