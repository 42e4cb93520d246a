mod text_normalization_tests;
