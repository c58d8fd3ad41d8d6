use crate::{DevicePtr, Error, HostMemory};

#[test]
fn test_alloc_is_zeroed() {
    let memory = HostMemory::new();
    let ptr = memory.alloc(16);
    assert!(!ptr.is_null());
    assert_eq!(memory.size(ptr).unwrap(), 16);
    assert_eq!(memory.read::<f32>(ptr).unwrap(), vec![0.0; 4]);
}

#[test]
fn test_write_then_update() {
    let memory = HostMemory::new();
    let ptr = memory.alloc_from(&[1.0f32, 2.0, 3.0]);
    memory.write(ptr, &[5.0f32]).unwrap();

    let sum = memory.update::<f32, _>(ptr, |values| {
        values.iter_mut().for_each(|v| *v *= 2.0);
        values.iter().sum::<f32>()
    });
    assert_eq!(sum.unwrap(), 20.0);
    assert_eq!(memory.read::<f32>(ptr).unwrap(), vec![10.0, 4.0, 6.0]);
}

#[test]
fn test_write_past_end() {
    let memory = HostMemory::new();
    let ptr = memory.alloc(4);
    let err = memory.write(ptr, &[1i32, 2]).unwrap_err();
    assert!(matches!(err, Error::OutOfBounds { size: 8, buffer_size: 4, .. }));
}

#[test]
fn test_invalid_pointers() {
    let memory = HostMemory::new();
    assert!(matches!(memory.read::<u8>(DevicePtr::NULL), Err(Error::InvalidPointer { .. })));

    let ptr = memory.alloc(1);
    assert_eq!(memory.allocations(), 1);
    memory.free(ptr).unwrap();
    assert_eq!(memory.allocations(), 0);
    assert!(matches!(memory.free(ptr), Err(Error::InvalidPointer { .. })));
}
