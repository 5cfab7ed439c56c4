//! Basic usage example for `DynamicArray`.
//!
//! Fills an array with ten values, prints them, then empties the array and gives back its
//! memory step by step.

use dynamic_array::{DynamicArray, Result};

fn main() -> Result<()> {
    let mut array = DynamicArray::<i32>::new()?;

    println!(
        "Created DynamicArray with capacity {} for {}-byte elements",
        array.capacity(),
        array.element_size()
    );

    for value in 0..10 {
        array.push(value)?;
    }

    println!("Array elements:");
    for index in 0..array.len() {
        let value = array.get(index)?;
        println!("Element {index}: {value}");
    }

    array.clear();
    println!(
        "After clear: {} elements, capacity {}",
        array.len(),
        array.capacity()
    );

    // Nothing is left, so this keeps a single slot.
    array.shrink_to_fit()?;
    println!("After shrink_to_fit: capacity {}", array.capacity());

    array.release_buffer();
    println!(
        "After release_buffer: allocated = {}, capacity {}",
        array.is_allocated(),
        array.capacity()
    );

    Ok(())
}
