use approx::assert_relative_eq;
use ndarray::{arr2, Array2};
use std::sync::Arc;
use tempfile::tempdir;
use voxie_core::CancellationHandle;
use voxie_io::{
    impl_storable_compound, ByteOrder, CompoundField, CompoundType, Decoder, Encoder, EnumType,
    Error, File, IntegerType, ObjectReference, OpenMode, Storable, TypeDescriptor, TypeRegistry,
};

#[derive(Debug, Clone, PartialEq)]
struct Calibration {
    pixel_pitch: f64,
    threshold: u16,
    enabled: bool,
    label: String,
}

impl_storable_compound!(Calibration {
    pixel_pitch: f64,
    threshold: u16,
    enabled: bool,
    label: String,
});

fn calibration(label: &str) -> Calibration {
    Calibration {
        pixel_pitch: 0.055,
        threshold: 12,
        enabled: true,
        label: label.to_string(),
    }
}

#[test]
fn test_values_persist_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("persist.vxc");

    {
        let file = File::create(&path).unwrap();
        let entry = file.create_group("entry").unwrap();
        entry.create_group("detector").unwrap();
        entry
            .new_dataset::<Calibration>("detector/calibration", &[2])
            .unwrap()
            .write(&[calibration("left"), calibration("right")])
            .unwrap();
        entry.set_attr("title", &"flat field".to_string()).unwrap();
        file.close().unwrap();
    }

    let file = File::open(&path).unwrap();
    let entry = file.group("entry").unwrap();
    assert_eq!(entry.member_names().unwrap(), vec!["detector"]);
    assert_eq!(entry.attr::<String>("title").unwrap(), "flat field");

    let values: Vec<Calibration> = file
        .dataset("/entry/detector/calibration")
        .unwrap()
        .read()
        .unwrap();
    assert_eq!(values, vec![calibration("left"), calibration("right")]);
}

#[test]
fn test_bool_is_stored_as_unsigned_byte_enum() {
    let dir = tempdir().unwrap();
    let file = File::create(dir.path().join("bool.vxc")).unwrap();
    let flags = file.new_dataset::<bool>("flags", &[2]).unwrap();
    flags.write(&[true, false]).unwrap();

    let TypeDescriptor::Enum(ty) = flags.dtype().unwrap().as_ref().clone() else {
        panic!("bool should be stored as an enum");
    };
    assert_eq!(ty.base(), IntegerType::U8);
    assert_eq!(ty.value_of("FALSE"), Some(0));
    assert_eq!(ty.value_of("TRUE"), Some(1));

    // Reading the raw bytes back as `u8` is refused, the type differs.
    assert!(matches!(
        flags.read::<u8>(),
        Err(Error::TypeMismatch { .. })
    ));
}

/// A flag as written by a peer tool: the `FALSE`/`TRUE` enum over a signed
/// byte, with the raw value passed through unchecked.
struct PeerFlag(i8);

impl Storable for PeerFlag {
    fn type_descriptor() -> TypeDescriptor {
        TypeDescriptor::Enum(
            EnumType::new(IntegerType::I8, [("FALSE", 0), ("TRUE", 1)]).unwrap(),
        )
    }

    fn encode(&self, encoder: &mut Encoder<'_>, _target: &TypeDescriptor) -> voxie_io::Result<()> {
        encoder.write_le(&self.0.to_le_bytes())
    }

    fn decode(decoder: &mut Decoder<'_>, _stored: &TypeDescriptor) -> voxie_io::Result<Self> {
        Ok(Self(i8::from_le_bytes(decoder.read_le()?)))
    }
}

#[test]
fn test_bool_reads_signed_enum_and_rejects_other_values() {
    let dir = tempdir().unwrap();
    let file = File::create(dir.path().join("peer.vxc")).unwrap();
    let flags = file.new_dataset::<PeerFlag>("flags", &[3]).unwrap();
    flags
        .write(&[PeerFlag(1), PeerFlag(0), PeerFlag(2)])
        .unwrap();

    assert_eq!(flags.read_range::<bool>(0..2).unwrap(), vec![true, false]);
    assert!(matches!(
        flags.read::<bool>(),
        Err(Error::InvalidEnumValue { value: 2, .. })
    ));

    // Booleans are only ever written with the unsigned base.
    assert!(matches!(
        flags.write(&[true, false, true]),
        Err(Error::TypeMismatch { .. })
    ));
}

#[test]
fn test_invalid_bool_byte_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("corrupt.vxc");
    {
        let file = File::create(&path).unwrap();
        file.new_dataset::<bool>("flag", &[])
            .unwrap()
            .write_scalar(&true)
            .unwrap();
        file.close().unwrap();
    }

    // Flip the stored element from 1 to 2. The payload ends with the
    // element byte followed by an empty heap length (eight zero bytes) and
    // the zero attribute count (four bytes).
    let mut bytes = std::fs::read(&path).unwrap();
    let element = bytes.len() - 4 - 8 - 1;
    assert_eq!(bytes[element], 1);
    bytes[element] = 2;
    std::fs::write(&path, bytes).unwrap();

    let file = File::open(&path).unwrap();
    let err = file.dataset("flag").unwrap().read_scalar::<bool>().unwrap_err();
    assert!(matches!(err, Error::InvalidEnumValue { value: 2, .. }));
}

#[test]
fn test_type_mismatch_on_read_and_write() {
    let dir = tempdir().unwrap();
    let file = File::create(dir.path().join("types.vxc")).unwrap();
    let dataset = file.new_dataset::<u32>("counts", &[4]).unwrap();

    assert!(matches!(
        dataset.write(&[1.0_f32, 2.0, 3.0, 4.0]),
        Err(Error::TypeMismatch { .. })
    ));
    assert!(matches!(dataset.read::<i32>(), Err(Error::TypeMismatch { .. })));
    assert!(matches!(
        dataset.read::<Calibration>(),
        Err(Error::TypeMismatch { .. })
    ));
}

#[test]
fn test_shape_mismatch() {
    let dir = tempdir().unwrap();
    let file = File::create(dir.path().join("shape.vxc")).unwrap();
    let dataset = file.new_dataset::<u8>("bytes", &[3]).unwrap();

    assert!(matches!(dataset.write(&[1_u8, 2]), Err(Error::ShapeMismatch(_))));
    assert!(matches!(dataset.read_scalar::<u8>(), Err(Error::ShapeMismatch(_))));
}

#[test]
fn test_open_modes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("modes.vxc");

    assert!(matches!(File::open(&path), Err(Error::NotFound(_))));

    let file = File::options()
        .mode(OpenMode::CreateExclusive)
        .open(&path)
        .unwrap();
    file.create_group("first").unwrap();
    file.close().unwrap();

    assert!(matches!(
        File::options().mode(OpenMode::CreateExclusive).open(&path),
        Err(Error::AlreadyExists(_))
    ));

    let file = File::open_rw(&path).unwrap();
    assert_eq!(file.mode().unwrap(), OpenMode::ReadWrite);
    file.create_group("second").unwrap();
    file.close().unwrap();

    let file = File::open(&path).unwrap();
    assert_eq!(file.member_names().unwrap(), vec!["first", "second"]);
    drop(file);

    let file = File::create(&path).unwrap();
    assert!(file.member_names().unwrap().is_empty());
}

#[test]
fn test_create_on_occupied_name() {
    let dir = tempdir().unwrap();
    let file = File::create(dir.path().join("occupied.vxc")).unwrap();
    file.new_dataset::<f32>("data", &[1]).unwrap();

    assert!(matches!(
        file.new_dataset::<f32>("data", &[1]),
        Err(Error::AlreadyExists(_))
    ));
    assert!(matches!(
        file.create_group("data"),
        Err(Error::AlreadyExists(_))
    ));

    file.unlink("data").unwrap();
    assert!(file.new_dataset::<f32>("data", &[2]).is_ok());
}

#[test]
fn test_missing_objects() {
    let dir = tempdir().unwrap();
    let file = File::create(dir.path().join("missing.vxc")).unwrap();
    file.create_group("group").unwrap();

    assert!(matches!(file.dataset("nothing"), Err(Error::NotFound(_))));
    assert!(matches!(file.dataset("group"), Err(Error::NotFound(_))));
    assert!(matches!(file.group("nothing/deeper"), Err(Error::NotFound(_))));
    assert!(matches!(file.attr::<u8>("nothing"), Err(Error::NotFound(_))));
    assert!(!file.exists("nothing").unwrap());
    assert!(file.exists("group").unwrap());
}

#[test]
fn test_unlinked_handles_report_not_found() {
    let dir = tempdir().unwrap();
    let file = File::create(dir.path().join("unlinked.vxc")).unwrap();
    let dataset = file.new_dataset::<u8>("scratch", &[1]).unwrap();
    let reference = dataset.reference().unwrap();

    file.unlink("scratch").unwrap();
    assert!(matches!(dataset.read::<u8>(), Err(Error::NotFound(_))));
    assert!(matches!(file.dereference(reference), Err(Error::NotFound(_))));
}

#[test]
fn test_big_endian_bytes_on_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("big.vxc");
    {
        let file = File::options()
            .mode(OpenMode::CreateTruncate)
            .byte_order(ByteOrder::BigEndian)
            .open(&path)
            .unwrap();
        file.new_dataset::<u32>("value", &[])
            .unwrap()
            .write_scalar(&0x0A0B_0C0D_u32)
            .unwrap();
        file.close().unwrap();
    }

    let bytes = std::fs::read(&path).unwrap();
    let needle = [0x0A, 0x0B, 0x0C, 0x0D];
    assert!(bytes.windows(4).any(|w| w == needle));

    let file = File::open(&path).unwrap();
    assert_eq!(file.byte_order().unwrap(), ByteOrder::BigEndian);
    assert_eq!(
        file.dataset("value").unwrap().read_scalar::<u32>().unwrap(),
        0x0A0B_0C0D
    );
}

#[test]
fn test_object_references() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("refs.vxc");
    {
        let file = File::create(&path).unwrap();
        let refs = file.create_group("#refs#").unwrap();
        let a = refs.new_dataset::<f64>("a", &[2]).unwrap();
        a.write(&[1.5, 2.5]).unwrap();
        let b = refs.new_dataset::<String>("b", &[]).unwrap();
        b.write_scalar(&"volume".to_string()).unwrap();

        let index = file.new_dataset::<ObjectReference>("index", &[2]).unwrap();
        index
            .write(&[a.reference().unwrap(), b.reference().unwrap()])
            .unwrap();
        file.close().unwrap();
    }

    let file = File::open(&path).unwrap();
    let index: Vec<ObjectReference> = file.dataset("index").unwrap().read().unwrap();
    let a: Vec<f64> = file.dereference(index[0]).unwrap().read().unwrap();
    assert_relative_eq!(a[1], 2.5);
    let b: String = file.dereference(index[1]).unwrap().read_scalar().unwrap();
    assert_eq!(b, "volume");
    assert!(file.dereference_group(index[0]).is_err());
}

#[test]
fn test_strings_survive_rewrites() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("strings.vxc");
    let file = File::create(&path).unwrap();
    let names = file.new_dataset::<String>("names", &[2]).unwrap();
    names
        .write(&["alpha".to_string(), "beta".to_string()])
        .unwrap();
    names.write_slice(1, &["gamma".to_string()]).unwrap();
    file.close().unwrap();

    let file = File::open(&path).unwrap();
    let names: Vec<String> = file.dataset("names").unwrap().read().unwrap();
    assert_eq!(names, vec!["alpha", "gamma"]);
}

#[test]
fn test_ndarray_io() {
    let dir = tempdir().unwrap();
    let file = File::create(dir.path().join("array.vxc")).unwrap();
    let dataset = file.new_dataset::<i16>("image", &[2, 3]).unwrap();

    let image = arr2(&[[1_i16, 2, 3], [4, 5, 6]]);
    dataset.write_array(image.view()).unwrap();
    // Transposed views are written in logical order, not memory order.
    let other = file.new_dataset::<i16>("transposed", &[3, 2]).unwrap();
    other.write_array(image.t()).unwrap();

    let back = dataset.read_array::<i16>().unwrap();
    assert_eq!(back.shape(), &[2, 3]);
    assert_eq!(back.into_dimensionality::<ndarray::Ix2>().unwrap(), image);
    assert_eq!(
        other.read::<i16>().unwrap(),
        vec![1, 4, 2, 5, 3, 6]
    );

    let wrong: Array2<i16> = Array2::zeros((3, 3));
    assert!(matches!(
        dataset.write_array(wrong.view()),
        Err(Error::ShapeMismatch(_))
    ));
}

#[test]
fn test_resize_keeps_leading_elements() {
    let dir = tempdir().unwrap();
    let file = File::create(dir.path().join("resize.vxc")).unwrap();
    let dataset = file.new_dataset::<u32>("events", &[3]).unwrap();
    dataset.write(&[7_u32, 8, 9]).unwrap();

    dataset.resize(&[5]).unwrap();
    assert_eq!(dataset.read::<u32>().unwrap(), vec![7, 8, 9, 0, 0]);
    dataset.resize(&[1]).unwrap();
    assert_eq!(dataset.read::<u32>().unwrap(), vec![7]);
}

#[test]
fn test_cancelled_read() {
    let dir = tempdir().unwrap();
    let file = File::create(dir.path().join("cancel.vxc")).unwrap();
    let dataset = file.new_dataset::<u64>("values", &[10]).unwrap();

    let handle = CancellationHandle::new();
    assert_eq!(dataset.read_with::<u64>(&handle).unwrap().len(), 10);
    assert_relative_eq!(handle.progress(), 1.0);

    handle.cancel();
    assert!(matches!(
        dataset.read_with::<u64>(&handle),
        Err(Error::CoreError(voxie_core::Error::Cancelled))
    ));
}

#[test]
fn test_shared_descriptors() {
    let dir = tempdir().unwrap();
    let file = File::create(dir.path().join("shared.vxc")).unwrap();
    let a = file.new_dataset::<Calibration>("a", &[1]).unwrap();
    let b = file.new_dataset::<Calibration>("b", &[1]).unwrap();

    assert!(Arc::ptr_eq(&a.dtype().unwrap(), &b.dtype().unwrap()));
    assert!(Arc::ptr_eq(
        &a.dtype().unwrap(),
        &TypeRegistry::describe::<Calibration>()
    ));
}

#[test]
fn test_explicit_compound_with_padding() {
    let dir = tempdir().unwrap();
    let file = File::create(dir.path().join("padded.vxc")).unwrap();

    // A writer that aligns its fields: u8 at 0, f64 at 8, 16 bytes total.
    let padded = CompoundType::new(vec![
        CompoundField::new("0", u8::type_descriptor(), 0),
        CompoundField::new("1", f64::type_descriptor(), 8),
    ])
    .unwrap();
    let dataset = file
        .create_dataset("padded", TypeDescriptor::Compound(padded), &[1])
        .unwrap();

    // The packed tuple layout differs, so the values cannot be read as one.
    assert!(matches!(
        dataset.read::<(u8, f64)>(),
        Err(Error::TypeMismatch { .. })
    ));
    assert_eq!(dataset.storage_size().unwrap(), 16);
}

#[test]
fn test_string_rewrites_keep_storage_bounded() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("rewrites.vxc");
    let file = File::create(&path).unwrap();
    let notes = file.new_dataset::<String>("notes", &[1]).unwrap();

    let long = "y".repeat(1000);
    notes.write_slice(0, &[long.clone()]).unwrap();
    let initial = notes.storage_size().unwrap();
    for _ in 0..1000 {
        notes.write_slice(0, &[long.clone()]).unwrap();
    }
    assert_eq!(notes.storage_size().unwrap(), initial);
    assert_eq!(initial, 16 + 1000);

    notes.write_slice(1, &["short".to_string()]).unwrap();
    notes.resize(&[1]).unwrap();
    assert_eq!(notes.storage_size().unwrap(), initial);
    file.close().unwrap();

    let file = File::open(&path).unwrap();
    assert_eq!(file.dataset("notes").unwrap().read::<String>().unwrap(), vec![long]);
}

#[test]
fn test_invalid_descriptors_are_rejected_before_storage() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("invalid.vxc");
    let file = File::create(&path).unwrap();
    file.new_dataset::<u8>("kept", &[1]).unwrap();

    assert!(matches!(
        CompoundType::packed([
            ("a", TypeDescriptor::Integer(IntegerType::U8)),
            ("a", TypeDescriptor::Integer(IntegerType::U8)),
        ]),
        Err(Error::InvalidTypeDescriptor(_))
    ));
    assert!(matches!(
        TypeDescriptor::fixed_array(TypeDescriptor::Integer(IntegerType::U64), usize::MAX / 2),
        Err(Error::InvalidTypeDescriptor(_))
    ));

    // Assembled from the variant, bypassing the constructor.
    let huge = TypeDescriptor::FixedArray {
        element: Arc::new(TypeDescriptor::Integer(IntegerType::U64)),
        len: usize::MAX / 2,
    };
    assert!(matches!(
        file.create_dataset("big", huge, &[1]),
        Err(Error::InvalidTypeDescriptor(_))
    ));
    assert!(!file.exists("big").unwrap());
    file.close().unwrap();

    let file = File::open(&path).unwrap();
    assert_eq!(file.member_names().unwrap(), vec!["kept"]);
}
