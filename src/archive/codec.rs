use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::ArchiveFormat;
use crate::error::{Error, Result};

// Highest level that stays out of zstd's "ultra" memory range.
const ZSTD_LEVEL: i32 = 19;
const XZ_PRESET: u32 = 9;

pub(crate) type Decoder = Box<dyn Read + Send>;

/// Opens `path` and wraps it in the decompressor for `format`.
///
/// All decoders accept concatenated streams.
pub(crate) fn open_decoder(path: &Path, format: ArchiveFormat) -> io::Result<Decoder> {
    let file = File::open(path)?;
    let decoder: Decoder = match format {
        ArchiveFormat::Zstd => Box::new(zstd::stream::read::Decoder::new(file)?),
        ArchiveFormat::Gzip => Box::new(MultiGzDecoder::new(BufReader::new(file))),
        ArchiveFormat::Xz => Box::new(xz2::read::XzDecoder::new_multi_decoder(BufReader::new(
            file,
        ))),
        ArchiveFormat::Bzip2 => Box::new(bzip2::read::MultiBzDecoder::new(BufReader::new(file))),
    };
    Ok(decoder)
}

/// Compressing writer over a container file.
pub(crate) enum ContainerEncoder {
    Zstd(zstd::stream::write::Encoder<'static, File>),
    Gzip(GzEncoder<File>),
    Xz(xz2::write::XzEncoder<File>),
}

impl ContainerEncoder {
    pub(crate) fn new(file: File, format: ArchiveFormat) -> Result<Self> {
        Ok(match format {
            ArchiveFormat::Zstd => {
                ContainerEncoder::Zstd(zstd::stream::write::Encoder::new(file, ZSTD_LEVEL)?)
            }
            ArchiveFormat::Gzip => ContainerEncoder::Gzip(GzEncoder::new(file, Compression::best())),
            ArchiveFormat::Xz => ContainerEncoder::Xz(xz2::write::XzEncoder::new(file, XZ_PRESET)),
            ArchiveFormat::Bzip2 => {
                return Err(Error::Config(format!("{format} archives are read-only")));
            }
        })
    }

    /// Writes the compressor trailer and hands back the file.
    pub(crate) fn finish(self) -> io::Result<File> {
        match self {
            ContainerEncoder::Zstd(encoder) => encoder.finish(),
            ContainerEncoder::Gzip(encoder) => encoder.finish(),
            ContainerEncoder::Xz(encoder) => encoder.finish(),
        }
    }
}

impl Write for ContainerEncoder {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ContainerEncoder::Zstd(encoder) => encoder.write(buf),
            ContainerEncoder::Gzip(encoder) => encoder.write(buf),
            ContainerEncoder::Xz(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ContainerEncoder::Zstd(encoder) => encoder.flush(),
            ContainerEncoder::Gzip(encoder) => encoder.flush(),
            ContainerEncoder::Xz(encoder) => encoder.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn encode_then_decode_each_writable_format() {
        let dir = tempdir().expect("tempdir");
        for format in ArchiveFormat::ALL.into_iter().filter(|f| f.is_writable()) {
            let path = dir.path().join(format!("blob.{}", format.extension()));
            let file = File::create(&path).expect("create");
            let mut encoder = ContainerEncoder::new(file, format).expect("encoder");
            encoder.write_all(b"hello archive").expect("write");
            encoder.finish().expect("finish").sync_all().expect("sync");

            let mut decoded = String::new();
            open_decoder(&path, format)
                .expect("decoder")
                .read_to_string(&mut decoded)
                .expect("decode");
            assert_eq!(decoded, "hello archive", "format {format}");
        }
    }

    #[test]
    fn bzip2_encoder_is_refused() {
        let dir = tempdir().expect("tempdir");
        let file = File::create(dir.path().join("blob.bz2")).expect("create");
        assert!(matches!(
            ContainerEncoder::new(file, ArchiveFormat::Bzip2),
            Err(Error::Config(_))
        ));
    }
}
