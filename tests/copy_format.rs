//! End-to-end checks of produced COPY BINARY streams against an
//! independent re-parse of the wire format.

use bytes::Buf;
use chrono::NaiveDate;
use pg_copy::{
    COPY_SIGNATURE, Column, CopyValue, Error, HandlerRegistry, PgCopyWriter, PgType, RowWriter,
    Table, handlers::RawHandler,
};
use std::sync::Arc;

/// Minimal reference reader for the COPY BINARY format: verifies the
/// 19-byte header, collects each row's fields (None for the null
/// sentinel), and verifies the trailer ends the stream exactly.
fn reparse(stream: &[u8]) -> Vec<Vec<Option<Vec<u8>>>> {
    let mut buf = stream;

    let mut signature = [0u8; 11];
    buf.copy_to_slice(&mut signature);
    assert_eq!(COPY_SIGNATURE, signature);
    assert_eq!(0, buf.get_u32(), "flags");
    assert_eq!(0, buf.get_u32(), "header extension length");

    let mut rows = Vec::new();
    loop {
        let num_columns = buf.get_i16();
        if num_columns == -1 {
            break;
        }

        let mut fields = Vec::new();
        for _ in 0..num_columns {
            match buf.get_i32() {
                -1 => fields.push(None),
                len => {
                    let mut payload = vec![0; len as usize];
                    buf.copy_to_slice(&mut payload);
                    fields.push(Some(payload));
                }
            }
        }
        rows.push(fields);
    }

    assert!(buf.is_empty(), "bytes after trailer");
    rows
}

fn writer_for(types: &[PgType]) -> PgCopyWriter<Vec<u8>> {
    let registry = HandlerRegistry::default();
    let mut writer = PgCopyWriter::new(Vec::new(), &registry, types).unwrap();
    writer.open().unwrap();
    writer
}

#[test]
fn header_is_fixed_19_bytes() {
    let mut writer = writer_for(&[]);
    writer.close_blocking().unwrap();
    let (stream, _) = writer.into_parts();

    assert_eq!(21, stream.len()); // 19-byte header + 2-byte trailer
    assert_eq!(COPY_SIGNATURE, &stream[..11]);
    assert_eq!([0; 8], stream[11..19]);
}

#[test]
fn trailer_is_final_two_bytes() {
    let mut writer = writer_for(&[PgType::INT2]);
    writer.start_row().unwrap();
    writer.write(5i16).unwrap();
    writer.close_blocking().unwrap();
    let (stream, _) = writer.into_parts();

    assert_eq!([0xFF, 0xFF], stream[stream.len() - 2..]);
}

#[test]
fn bool_and_text_example_row() {
    let mut writer = writer_for(&[PgType::BOOL, PgType::TEXT]);
    writer.start_row().unwrap();
    writer.write(true).unwrap();
    writer.write("ab").unwrap();
    writer.close_blocking().unwrap();
    let (stream, _) = writer.into_parts();

    // column count 2, then (true, "ab"): length 1 + value 1, then
    // length 2 + UTF-8 bytes
    assert_eq!(
        [0, 2, 0, 0, 0, 1, 1, 0, 0, 0, 2, 0x61, 0x62],
        stream[19..stream.len() - 2]
    );
}

#[test]
fn null_is_sentinel_for_every_width() {
    let types = [
        PgType::BOOL,
        PgType::INT2,
        PgType::INT4,
        PgType::INT8,
        PgType::FLOAT8,
        PgType::TEXT,
    ];
    let mut writer = writer_for(&types);
    writer.start_row().unwrap();
    for _ in &types {
        writer.write(CopyValue::Null).unwrap();
    }
    writer.close_blocking().unwrap();
    let (stream, _) = writer.into_parts();

    let rows = reparse(&stream);
    assert_eq!(vec![vec![None; types.len()]], rows);

    // on the wire each field is exactly FF FF FF FF
    let body = &stream[21..stream.len() - 2];
    assert_eq!(vec![0xFF; 4 * types.len()], body);
}

#[test]
fn field_count_reparses_per_row() {
    let mut writer = writer_for(&[PgType::INT4, PgType::TEXT, PgType::BOOL]);
    for i in 0..10 {
        writer.start_row().unwrap();
        writer.write(i).unwrap();
        writer.write(format!("row{i}")).unwrap();
        writer.write(i % 2 == 0).unwrap();
    }
    writer.close_blocking().unwrap();
    let (stream, _) = writer.into_parts();

    let rows = reparse(&stream);
    assert_eq!(10, rows.len());
    for fields in &rows {
        assert_eq!(3, fields.len());
    }
}

#[test]
fn round_trip_boundary_values() {
    let types = [
        PgType::INT2,
        PgType::INT4,
        PgType::INT8,
        PgType::FLOAT4,
        PgType::FLOAT8,
        PgType::TEXT,
        PgType::DATE,
    ];
    let pg_epoch = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();

    let mut writer = writer_for(&types);
    writer.start_row().unwrap();
    writer.write(i16::MIN).unwrap();
    writer.write(0i32).unwrap();
    writer.write(i64::MAX).unwrap();
    writer.write(-0.0f32).unwrap();
    writer.write(0.0f64).unwrap();
    writer.write("").unwrap();
    writer.write(pg_epoch).unwrap();
    writer.close_blocking().unwrap();
    let (stream, _) = writer.into_parts();

    let rows = reparse(&stream);
    let fields = &rows[0];

    let mut f = fields[0].as_deref().unwrap();
    assert_eq!(i16::MIN, f.get_i16());
    let mut f = fields[1].as_deref().unwrap();
    assert_eq!(0, f.get_i32());
    let mut f = fields[2].as_deref().unwrap();
    assert_eq!(i64::MAX, f.get_i64());
    let mut f = fields[3].as_deref().unwrap();
    assert_eq!((-0.0f32).to_bits(), f.get_u32());
    let mut f = fields[4].as_deref().unwrap();
    assert_eq!(0.0f64.to_bits(), f.get_u64());
    assert_eq!(Some(&Vec::new()), fields[5].as_ref());
    let mut f = fields[6].as_deref().unwrap();
    let days = f.get_i32();
    assert_eq!(pg_epoch, pg_epoch + chrono::Duration::days(days as i64));
}

#[test]
fn round_trip_timestamp() {
    let ts = NaiveDate::from_ymd_opt(2024, 6, 1)
        .unwrap()
        .and_hms_micro_opt(12, 30, 45, 123_456)
        .unwrap();

    let mut writer = writer_for(&[PgType::TIMESTAMP]);
    writer.start_row().unwrap();
    writer.write(ts).unwrap();
    writer.close_blocking().unwrap();
    let (stream, _) = writer.into_parts();

    let rows = reparse(&stream);
    let mut f = rows[0][0].as_deref().unwrap();
    let micros = f.get_i64();

    let pg_epoch = NaiveDate::from_ymd_opt(2000, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    assert_eq!(ts, pg_epoch + chrono::Duration::microseconds(micros));
}

#[test]
fn unsupported_type_writes_nothing() {
    let registry = HandlerRegistry::default();
    let inet = PgType::from(869);
    let Err(err) = PgCopyWriter::new(Vec::<u8>::new(), &registry, &[inet]) else {
        panic!("expected construction to fail");
    };
    assert!(matches!(err, Error::UnsupportedType(ty) if ty == inet));
}

#[test]
fn registered_custom_type_streams_through() {
    let inet = PgType::from(869);
    let mut registry = HandlerRegistry::default();
    registry.register(inet, Arc::new(RawHandler::new(inet)));

    let mut writer = PgCopyWriter::new(Vec::<u8>::new(), &registry, &[inet]).unwrap();
    writer.open().unwrap();
    writer.start_row().unwrap();
    let payload = bytes::Bytes::from_static(&[2, 32, 0, 4, 127, 0, 0, 1]);
    writer
        .write(CopyValue::Other(inet, payload.clone()))
        .unwrap();
    writer.close_blocking().unwrap();
    let (stream, _) = writer.into_parts();

    let rows = reparse(&stream);
    assert_eq!(Some(payload.to_vec()), rows[0][0]);
}

#[test]
fn row_writer_stream_reparses() {
    let table = Table::new(
        "events",
        vec![
            Column::new("id", PgType::INT8),
            Column::new("kind", PgType::VARCHAR),
            Column::new("payload", PgType::JSONB),
        ],
    );
    let registry = HandlerRegistry::default();
    let writer = RowWriter::open(&table, &registry, Vec::<u8>::new()).unwrap();

    writer
        .write_row(|row| {
            row.set("id", 1i64)?;
            row.set("kind", "created")?;
            row.set("payload", "{\"ok\":true}")
        })
        .unwrap();
    writer.write_row(|row| row.set("id", 2i64)).unwrap();
    let stream = writer.close().unwrap();

    let rows = reparse(&stream);
    assert_eq!(2, rows.len());
    assert_eq!(3, rows[0].len());
    // jsonb payload carries the version byte
    assert_eq!(1, rows[0][2].as_deref().unwrap()[0]);
    assert_eq!(None, rows[1][1]);
    assert_eq!(None, rows[1][2]);
}

#[tokio::test]
async fn async_writer_reparses() {
    let registry = HandlerRegistry::default();
    let mut writer =
        PgCopyWriter::new(Vec::<u8>::new(), &registry, &[PgType::INT4, PgType::BOOL]).unwrap();
    writer.open().unwrap();
    for i in 0..3 {
        writer.start_row().unwrap();
        writer.write(i).unwrap();
        writer.write(i != 0).unwrap();
        writer.flush().await.unwrap();
    }
    writer.close().await.unwrap();
    let (stream, rest) = writer.into_parts();
    assert!(rest.is_empty());

    let rows = reparse(&stream);
    assert_eq!(3, rows.len());
}
