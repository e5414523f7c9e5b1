//! Stream Iterators: stable, allocation-free forward traversal
//! over `(file_index, stream_index)` across all input or output files.

use crate::ids::StreamId;
use crate::input::InputFile;
use crate::output::OutputFile;

/// Iterates every InputStream across every InputFile, in file-then-stream
/// order — the same order `ist_iter` walks in the original.
pub struct InputStreamIter<'a> {
    files: &'a [InputFile],
    file: usize,
    stream: usize,
}

impl<'a> InputStreamIter<'a> {
    pub fn new(files: &'a [InputFile]) -> Self {
        Self {
            files,
            file: 0,
            stream: 0,
        }
    }

    /// Resumes traversal just past `from`, matching `ist_iter`'s
    /// "pass previous, get next" contract without needing to restart.
    pub fn resume_after(files: &'a [InputFile], from: StreamId) -> Self {
        Self {
            files,
            file: from.file.0,
            stream: from.stream.0 + 1,
        }
    }
}

impl<'a> Iterator for InputStreamIter<'a> {
    type Item = StreamId;

    fn next(&mut self) -> Option<StreamId> {
        while self.file < self.files.len() {
            let file = &self.files[self.file];
            if self.stream < file.streams.len() {
                let id = StreamId::new(self.file, self.stream);
                self.stream += 1;
                return Some(id);
            }
            self.file += 1;
            self.stream = 0;
        }
        None
    }
}

/// Iterates every OutputStream across every OutputFile, in file-then-stream
/// order — the `ost_iter` equivalent.
pub struct OutputStreamIter<'a> {
    files: &'a [OutputFile],
    file: usize,
    stream: usize,
}

impl<'a> OutputStreamIter<'a> {
    pub fn new(files: &'a [OutputFile]) -> Self {
        Self {
            files,
            file: 0,
            stream: 0,
        }
    }

    pub fn resume_after(files: &'a [OutputFile], from: StreamId) -> Self {
        Self {
            files,
            file: from.file.0,
            stream: from.stream.0 + 1,
        }
    }
}

impl<'a> Iterator for OutputStreamIter<'a> {
    type Item = StreamId;

    fn next(&mut self) -> Option<StreamId> {
        while self.file < self.files.len() {
            let file = &self.files[self.file];
            if self.stream < file.streams.len() {
                let id = StreamId::new(self.file, self.stream);
                self.stream += 1;
                return Some(id);
            }
            self.file += 1;
            self.stream = 0;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_all_streams_in_file_then_stream_order() {
        let mut f0 = InputFile::new(0);
        f0.streams.push(crate::input::InputStream::new(StreamId::new(0, 0)));
        f0.streams.push(crate::input::InputStream::new(StreamId::new(0, 1)));
        let mut f1 = InputFile::new(1);
        f1.streams.push(crate::input::InputStream::new(StreamId::new(1, 0)));
        let files = vec![f0, f1];

        let ids: Vec<StreamId> = InputStreamIter::new(&files).collect();
        assert_eq!(ids, vec![StreamId::new(0, 0), StreamId::new(0, 1), StreamId::new(1, 0)]);
    }

    #[test]
    fn resume_after_skips_already_seen() {
        let mut f0 = InputFile::new(0);
        f0.streams.push(crate::input::InputStream::new(StreamId::new(0, 0)));
        f0.streams.push(crate::input::InputStream::new(StreamId::new(0, 1)));
        let files = vec![f0];

        let ids: Vec<StreamId> = InputStreamIter::resume_after(&files, StreamId::new(0, 0)).collect();
        assert_eq!(ids, vec![StreamId::new(0, 1)]);
    }

    #[test]
    fn empty_files_yield_nothing() {
        let files: Vec<InputFile> = vec![];
        assert_eq!(InputStreamIter::new(&files).count(), 0);
    }
}
