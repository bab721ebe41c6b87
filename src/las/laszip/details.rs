use super::{CompressorType, LazVlr};
use crate::record::{
    LayeredPointRecordCompressor, LayeredPointRecordDecompressor, RecordCompressor,
    RecordDecompressor, SequentialPointRecordCompressor, SequentialPointRecordDecompressor,
};
use crate::LasZipError;
use std::io::{Read, Write};

/// Creates the record decompressor matching the layout described by the vlr,
/// with one field per item.
pub(crate) fn record_decompressor_from_vlr<'a, R: Read + Send + 'a>(
    vlr: &LazVlr,
    input: R,
) -> crate::Result<Box<dyn RecordDecompressor<R> + Send + 'a>> {
    let mut decompressor = match vlr.compressor {
        CompressorType::PointWise | CompressorType::PointWiseChunked => {
            Box::new(SequentialPointRecordDecompressor::new(input))
                as Box<dyn RecordDecompressor<R> + Send>
        }
        CompressorType::LayeredChunked => Box::new(LayeredPointRecordDecompressor::new(input))
            as Box<dyn RecordDecompressor<R> + Send>,
        CompressorType::None => {
            return Err(LasZipError::UnsupportedCompressorType(vlr.compressor));
        }
    };

    decompressor.set_fields_from(vlr.items())?;
    Ok(decompressor)
}

/// Creates the record compressor matching the layout described by the vlr,
/// with one field per item.
pub(crate) fn record_compressor_from_vlr<'a, W: Write + Send + 'a>(
    vlr: &LazVlr,
    output: W,
) -> crate::Result<Box<dyn RecordCompressor<W> + Send + 'a>> {
    let mut compressor = match vlr.compressor {
        CompressorType::PointWise | CompressorType::PointWiseChunked => {
            Box::new(SequentialPointRecordCompressor::new(output))
                as Box<dyn RecordCompressor<W> + Send>
        }
        CompressorType::LayeredChunked => Box::new(LayeredPointRecordCompressor::new(output))
            as Box<dyn RecordCompressor<W> + Send>,
        CompressorType::None => {
            return Err(LasZipError::UnsupportedCompressorType(vlr.compressor));
        }
    };
    compressor.set_fields_from(vlr.items())?;
    Ok(compressor)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::las::laszip::{LazItem, LazItemType, LazVlrBuilder};
    use std::io::Cursor;

    #[test]
    fn test_record_follows_compressor_type() {
        let vlr = LazVlrBuilder::new()
            .with_laz_items(vec![LazItem::new(LazItemType::Byte14(3), 3)])
            .build();
        let compressor = record_compressor_from_vlr(&vlr, Cursor::new(vec![])).unwrap();
        assert_eq!(compressor.record_size(), 3);

        let vlr = LazVlrBuilder::new()
            .with_laz_items(vec![LazItem::new(LazItemType::Byte14(3), 3)])
            .with_compressor_type(CompressorType::PointWiseChunked)
            .build();
        assert!(matches!(
            record_compressor_from_vlr(&vlr, Cursor::new(vec![])),
            Err(LasZipError::UnsupportedLazItemVersion(
                LazItemType::Byte14(3),
                3
            ))
        ));

        let vlr = LazVlrBuilder::new()
            .with_compressor_type(CompressorType::None)
            .build();
        assert!(matches!(
            record_decompressor_from_vlr(&vlr, Cursor::new(vec![])),
            Err(LasZipError::UnsupportedCompressorType(CompressorType::None))
        ));
    }
}
