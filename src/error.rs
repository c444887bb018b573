use std::io;
use std::num::TryFromIntError;
use quick_error::quick_error;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        /// The cache root exists but `screengif/` could not be created inside it
        CacheDirectoryCreateFailed(err: io::Error) {
            display("can't create cache directory: {}", err)
        }
        /// The per-session scratch directory could not be created
        TmpDirectoryCreateFailed(err: io::Error) {
            display("can't create temporary frame directory: {}", err)
        }
        CacheDirectoryNotFound {
            display("no cache directory available (set cache_dir, XDG_CACHE_HOME or HOME)")
        }
        EmptyTarget {
            display("capture target is missing")
        }
        EmptyFrame {
            display("snapshot returned no image")
        }
        FrameEncodeFailed(msg: String) {
            display("can't encode captured frame: {}", msg)
        }
        StorageWriteFailed(err: io::Error) {
            display("can't store frame: {}", err)
        }
        FileListingFailed(err: io::Error) {
            display("can't list stored frames: {}", err)
        }
        AnimationGenerateFailed(msg: String) {
            display("GIF generation failed: {}", msg)
        }
        CleanupFailed(err: io::Error) {
            display("can't remove temporary frames: {}", err)
        }
        AlreadyRecording {
            display("a recording is already in progress")
        }
        NoFrames {
            display("found no usable frames to encode")
        }
        WrongSize(msg: String) {
            display("{}", msg)
            from(e: TryFromIntError) -> (e.to_string())
        }
        /// Internal error
        ThreadSend {
            display("internal error; worker unexpectedly stopped")
        }
    }
}

/// Fieldless mirror of [`Error`], for matching on the failure kind without owning the cause
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    CacheDirectoryCreateFailed,
    TmpDirectoryCreateFailed,
    CacheDirectoryNotFound,
    EmptyTarget,
    EmptyFrame,
    FrameEncodeFailed,
    StorageWriteFailed,
    FileListingFailed,
    AnimationGenerateFailed,
    CleanupFailed,
    AlreadyRecording,
    NoFrames,
    WrongSize,
    ThreadSend,
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CacheDirectoryCreateFailed(_) => ErrorKind::CacheDirectoryCreateFailed,
            Self::TmpDirectoryCreateFailed(_) => ErrorKind::TmpDirectoryCreateFailed,
            Self::CacheDirectoryNotFound => ErrorKind::CacheDirectoryNotFound,
            Self::EmptyTarget => ErrorKind::EmptyTarget,
            Self::EmptyFrame => ErrorKind::EmptyFrame,
            Self::FrameEncodeFailed(_) => ErrorKind::FrameEncodeFailed,
            Self::StorageWriteFailed(_) => ErrorKind::StorageWriteFailed,
            Self::FileListingFailed(_) => ErrorKind::FileListingFailed,
            Self::AnimationGenerateFailed(_) => ErrorKind::AnimationGenerateFailed,
            Self::CleanupFailed(_) => ErrorKind::CleanupFailed,
            Self::AlreadyRecording => ErrorKind::AlreadyRecording,
            Self::NoFrames => ErrorKind::NoFrames,
            Self::WrongSize(_) => ErrorKind::WrongSize,
            Self::ThreadSend => ErrorKind::ThreadSend,
        }
    }
}

pub type CatResult<T, E = Error> = Result<T, E>;

impl From<gif::EncodingError> for Error {
    #[cold]
    fn from(err: gif::EncodingError) -> Self {
        Self::AnimationGenerateFailed(err.to_string())
    }
}

impl From<imagequant::Error> for Error {
    #[cold]
    fn from(err: imagequant::Error) -> Self {
        Self::AnimationGenerateFailed(format!("pngquant error: {err}"))
    }
}

impl<T> From<crossbeam_channel::SendError<T>> for Error {
    #[cold]
    fn from(_: crossbeam_channel::SendError<T>) -> Self {
        Self::ThreadSend
    }
}
